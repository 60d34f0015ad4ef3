pub mod amenities;
pub mod location;
pub mod price;
