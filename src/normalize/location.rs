use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLocation {
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub region: Option<String>,
}

/// Canonical city table. Keys are lowercase, either diacritic-stripped or
/// full form; entries cover abbreviations, declined forms seen in free-text
/// queries ("u Zagrebu"), and common alternate spellings.
const CITY_TABLE: &[(&str, &str, Option<&str>)] = &[
    // (key, canonical, region)
    ("zagreb", "Zagreb", Some("Grad Zagreb")),
    ("zagrebu", "Zagreb", Some("Grad Zagreb")),
    ("zg", "Zagreb", Some("Grad Zagreb")),
    ("split", "Split", Some("Splitsko-dalmatinska")),
    ("splitu", "Split", Some("Splitsko-dalmatinska")),
    ("st", "Split", Some("Splitsko-dalmatinska")),
    ("rijeka", "Rijeka", Some("Primorsko-goranska")),
    ("rijeci", "Rijeka", Some("Primorsko-goranska")),
    ("ri", "Rijeka", Some("Primorsko-goranska")),
    ("osijek", "Osijek", Some("Osječko-baranjska")),
    ("osijeku", "Osijek", Some("Osječko-baranjska")),
    ("os", "Osijek", Some("Osječko-baranjska")),
    ("zadar", "Zadar", Some("Zadarska")),
    ("zadru", "Zadar", Some("Zadarska")),
    ("zd", "Zadar", Some("Zadarska")),
    ("dubrovnik", "Dubrovnik", Some("Dubrovačko-neretvanska")),
    ("dubrovniku", "Dubrovnik", Some("Dubrovačko-neretvanska")),
    ("du", "Dubrovnik", Some("Dubrovačko-neretvanska")),
    ("pula", "Pula", Some("Istarska")),
    ("puli", "Pula", Some("Istarska")),
    ("pu", "Pula", Some("Istarska")),
    ("varazdin", "Varaždin", Some("Varaždinska")),
    ("varaždin", "Varaždin", Some("Varaždinska")),
    ("varazdinu", "Varaždin", Some("Varaždinska")),
    ("vz", "Varaždin", Some("Varaždinska")),
    ("sibenik", "Šibenik", Some("Šibensko-kninska")),
    ("šibenik", "Šibenik", Some("Šibensko-kninska")),
    ("sibeniku", "Šibenik", Some("Šibensko-kninska")),
    ("si", "Šibenik", Some("Šibensko-kninska")),
    ("karlovac", "Karlovac", Some("Karlovačka")),
    ("karlovcu", "Karlovac", Some("Karlovačka")),
    ("ka", "Karlovac", Some("Karlovačka")),
    ("sisak", "Sisak", Some("Sisačko-moslavačka")),
    ("sisku", "Sisak", Some("Sisačko-moslavačka")),
    ("sk", "Sisak", Some("Sisačko-moslavačka")),
    ("velika gorica", "Velika Gorica", Some("Zagrebačka")),
    ("velikoj gorici", "Velika Gorica", Some("Zagrebačka")),
    ("slavonski brod", "Slavonski Brod", Some("Brodsko-posavska")),
    ("slavonskom brodu", "Slavonski Brod", Some("Brodsko-posavska")),
    ("bjelovar", "Bjelovar", Some("Bjelovarsko-bilogorska")),
    ("kastela", "Kaštela", Some("Splitsko-dalmatinska")),
    ("kaštela", "Kaštela", Some("Splitsko-dalmatinska")),
    ("samobor", "Samobor", Some("Zagrebačka")),
    ("samoboru", "Samobor", Some("Zagrebačka")),
    ("vinkovci", "Vinkovci", Some("Vukovarsko-srijemska")),
    ("vinkovcima", "Vinkovci", Some("Vukovarsko-srijemska")),
    ("koprivnica", "Koprivnica", Some("Koprivničko-križevačka")),
    ("dakovo", "Đakovo", Some("Osječko-baranjska")),
    ("đakovo", "Đakovo", Some("Osječko-baranjska")),
    ("djakovo", "Đakovo", Some("Osječko-baranjska")),
    ("vukovar", "Vukovar", Some("Vukovarsko-srijemska")),
    ("cakovec", "Čakovec", Some("Međimurska")),
    ("čakovec", "Čakovec", Some("Međimurska")),
    ("pozega", "Požega", Some("Požeško-slavonska")),
    ("požega", "Požega", Some("Požeško-slavonska")),
    ("zapresic", "Zaprešić", Some("Zagrebačka")),
    ("zaprešić", "Zaprešić", Some("Zagrebačka")),
    ("sinj", "Sinj", Some("Splitsko-dalmatinska")),
    ("petrinja", "Petrinja", Some("Sisačko-moslavačka")),
    ("metkovic", "Metković", Some("Dubrovačko-neretvanska")),
    ("metković", "Metković", Some("Dubrovačko-neretvanska")),
    ("knin", "Knin", Some("Šibensko-kninska")),
    ("slatina", "Slatina", Some("Virovitičko-podravska")),
    ("daruvar", "Daruvar", Some("Bjelovarsko-bilogorska")),
    ("porec", "Poreč", Some("Istarska")),
    ("poreč", "Poreč", Some("Istarska")),
    ("porecu", "Poreč", Some("Istarska")),
    ("rovinj", "Rovinj", Some("Istarska")),
    ("rovinju", "Rovinj", Some("Istarska")),
    ("umag", "Umag", Some("Istarska")),
    ("umagu", "Umag", Some("Istarska")),
    ("makarska", "Makarska", Some("Splitsko-dalmatinska")),
    ("makarskoj", "Makarska", Some("Splitsko-dalmatinska")),
    ("trogir", "Trogir", Some("Splitsko-dalmatinska")),
    ("trogiru", "Trogir", Some("Splitsko-dalmatinska")),
    ("crikvenica", "Crikvenica", Some("Primorsko-goranska")),
    ("opatija", "Opatija", Some("Primorsko-goranska")),
    ("opatiji", "Opatija", Some("Primorsko-goranska")),
    ("krapina", "Krapina", Some("Krapinsko-zagorska")),
    ("krizevci", "Križevci", Some("Koprivničko-križevačka")),
    ("križevci", "Križevci", Some("Koprivničko-križevačka")),
    ("kutina", "Kutina", Some("Sisačko-moslavačka")),
    ("nasice", "Našice", Some("Osječko-baranjska")),
    ("našice", "Našice", Some("Osječko-baranjska")),
    ("nova gradiska", "Nova Gradiška", Some("Brodsko-posavska")),
    ("nova gradiška", "Nova Gradiška", Some("Brodsko-posavska")),
    ("ogulin", "Ogulin", Some("Karlovačka")),
    ("omis", "Omiš", Some("Splitsko-dalmatinska")),
    ("omiš", "Omiš", Some("Splitsko-dalmatinska")),
    ("solin", "Solin", Some("Splitsko-dalmatinska")),
    ("solinu", "Solin", Some("Splitsko-dalmatinska")),
    ("supetar", "Supetar", Some("Splitsko-dalmatinska")),
    ("hvar", "Hvar", Some("Splitsko-dalmatinska")),
    ("hvaru", "Hvar", Some("Splitsko-dalmatinska")),
    ("korcula", "Korčula", Some("Dubrovačko-neretvanska")),
    ("korčula", "Korčula", Some("Dubrovačko-neretvanska")),
    ("ploce", "Ploče", Some("Dubrovačko-neretvanska")),
    ("ploče", "Ploče", Some("Dubrovačko-neretvanska")),
    ("imotski", "Imotski", Some("Splitsko-dalmatinska")),
    ("gospic", "Gospić", Some("Ličko-senjska")),
    ("gospić", "Gospić", Some("Ličko-senjska")),
    ("senj", "Senj", Some("Ličko-senjska")),
    ("pag", "Pag", Some("Zadarska")),
    ("pagu", "Pag", Some("Zadarska")),
    ("rab", "Rab", Some("Primorsko-goranska")),
    ("rabu", "Rab", Some("Primorsko-goranska")),
    ("krk", "Krk", Some("Primorsko-goranska")),
    ("krku", "Krk", Some("Primorsko-goranska")),
    ("mali losinj", "Mali Lošinj", Some("Primorsko-goranska")),
    ("mali lošinj", "Mali Lošinj", Some("Primorsko-goranska")),
    ("labin", "Labin", Some("Istarska")),
    ("labinu", "Labin", Some("Istarska")),
    ("pazin", "Pazin", Some("Istarska")),
    ("buzet", "Buzet", Some("Istarska")),
    ("novigrad", "Novigrad", Some("Istarska")),
    ("vodice", "Vodice", Some("Šibensko-kninska")),
    ("vodicama", "Vodice", Some("Šibensko-kninska")),
    ("biograd", "Biograd na Moru", Some("Zadarska")),
    ("biograd na moru", "Biograd na Moru", Some("Zadarska")),
    ("nin", "Nin", Some("Zadarska")),
    ("obrovac", "Obrovac", Some("Zadarska")),
    ("benkovac", "Benkovac", Some("Zadarska")),
    ("virovitica", "Virovitica", Some("Virovitičko-podravska")),
    ("zupanja", "Županja", Some("Vukovarsko-srijemska")),
    ("županja", "Županja", Some("Vukovarsko-srijemska")),
    ("ivanic-grad", "Ivanić-Grad", Some("Zagrebačka")),
    ("ivanic grad", "Ivanić-Grad", Some("Zagrebačka")),
    ("dugo selo", "Dugo Selo", Some("Zagrebačka")),
    ("sveta nedelja", "Sveta Nedelja", Some("Zagrebačka")),
    ("jastrebarsko", "Jastrebarsko", Some("Zagrebačka")),
    ("vrbovec", "Vrbovec", Some("Zagrebačka")),
    ("cavtat", "Cavtat", Some("Dubrovačko-neretvanska")),
    ("medulin", "Medulin", Some("Istarska")),
    ("fazana", "Fažana", Some("Istarska")),
    ("fažana", "Fažana", Some("Istarska")),
    ("vrsar", "Vrsar", Some("Istarska")),
    ("baska voda", "Baška Voda", Some("Splitsko-dalmatinska")),
    ("baška voda", "Baška Voda", Some("Splitsko-dalmatinska")),
    ("podstrana", "Podstrana", Some("Splitsko-dalmatinska")),
    ("dugopolje", "Dugopolje", Some("Splitsko-dalmatinska")),
    ("tribunj", "Tribunj", Some("Šibensko-kninska")),
    ("primosten", "Primošten", Some("Šibensko-kninska")),
    ("primošten", "Primošten", Some("Šibensko-kninska")),
];

const ZAGREB_DISTRICTS: &[&str] = &[
    "tresnjevka",
    "maksimir",
    "dubrava",
    "crnomerec",
    "trnje",
    "novi zagreb",
    "sesvete",
    "stenjevec",
    "podsljeme",
    "pescenica",
    "zitnjak",
    "gornji grad",
    "donji grad",
    "medvescak",
    "jarun",
    "spansko",
    "malesnica",
    "vrapce",
    "knezija",
    "savica",
    "borovje",
    "dugave",
    "zaprude",
    "utrine",
    "travno",
    "siget",
    "remetinec",
    "laniste",
    "sveta klara",
    "gajnice",
    "podsused",
    "markusevec",
    "gracani",
    "sestine",
    "mlinovi",
    "kustosija",
    "ravnice",
];

const SPLIT_DISTRICTS: &[&str] = &[
    "bacvice",
    "firule",
    "meje",
    "spinut",
    "varos",
    "gripe",
    "mertojak",
    "pujanke",
    "sucidar",
    "split 3",
    "znjan",
    "trstenik",
    "mejasi",
    "kman",
    "kocunar",
    "lovret",
    "manus",
    "lucac",
    "visoka",
    "plokite",
    "blatine",
    "skrape",
];

const STRIP_PREFIXES: &[&str] = &["grad ", "općina ", "opcina ", "city of "];

/// Replace Croatian diacritics with their ASCII counterparts.
pub fn strip_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'č' | 'ć' => 'c',
            'Č' | 'Ć' => 'C',
            'đ' => 'd',
            'Đ' => 'D',
            'š' => 's',
            'Š' => 'S',
            'ž' => 'z',
            'Ž' => 'Z',
            _ => c,
        })
        .collect()
}

fn lookup_city(part: &str) -> Option<(&'static str, Option<&'static str>)> {
    let lower = part.to_lowercase();
    let stripped = strip_diacritics(&lower);
    CITY_TABLE
        .iter()
        .find(|(key, _, _)| *key == lower || *key == stripped)
        .map(|(_, canonical, region)| (*canonical, *region))
}

fn is_district_of(part: &str, districts: &[&str]) -> bool {
    let key = strip_diacritics(&part.to_lowercase());
    districts.contains(&key.as_str())
}

fn strip_admin_prefix(part: &str) -> &str {
    let lower = part.to_lowercase();
    for prefix in STRIP_PREFIXES {
        if lower.starts_with(prefix) {
            return part[prefix.len()..].trim_start();
        }
    }
    part
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a raw location string into a canonical city plus address rest.
pub fn normalize_location(raw: &str) -> NormalizedLocation {
    let parts: Vec<String> = raw
        .split([',', '-', '–'])
        .map(|p| strip_admin_prefix(p.trim()).to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        return NormalizedLocation {
            city: String::new(),
            address: String::new(),
            region: None,
        };
    }

    // Direct city-table hit on any part wins; the rest becomes the address.
    for (i, part) in parts.iter().enumerate() {
        if let Some((city, region)) = lookup_city(part) {
            let address = parts
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, p)| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return NormalizedLocation {
                city: city.to_string(),
                address,
                region: region.map(String::from),
            };
        }
    }

    // District names imply their city; the whole remainder stays the address.
    for part in &parts {
        if is_district_of(part, ZAGREB_DISTRICTS) {
            return NormalizedLocation {
                city: "Zagreb".into(),
                address: parts.join(", "),
                region: Some("Grad Zagreb".into()),
            };
        }
        if is_district_of(part, SPLIT_DISTRICTS) {
            return NormalizedLocation {
                city: "Split".into(),
                address: parts.join(", "),
                region: Some("Splitsko-dalmatinska".into()),
            };
        }
    }

    NormalizedLocation {
        city: title_case(&parts[0]),
        address: parts[1..].join(", "),
        region: None,
    }
}

/// Canonicalize a freeform city mention (as used by the filter extractor);
/// returns the canonical spelling when the table knows it.
pub fn canonical_city(raw: &str) -> Option<String> {
    lookup_city(strip_admin_prefix(raw.trim())).map(|(city, _)| city.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_city() {
        let loc = normalize_location("Zagreb");
        assert_eq!(loc.city, "Zagreb");
        assert_eq!(loc.address, "");
        assert_eq!(loc.region.as_deref(), Some("Grad Zagreb"));
    }

    #[test]
    fn city_with_address_parts() {
        let loc = normalize_location("Zagreb, Ilica 42");
        assert_eq!(loc.city, "Zagreb");
        assert_eq!(loc.address, "Ilica 42");
    }

    #[test]
    fn abbreviation_resolves() {
        let loc = normalize_location("ZG");
        assert_eq!(loc.city, "Zagreb");
    }

    #[test]
    fn declined_form_resolves() {
        assert_eq!(normalize_location("Zagrebu").city, "Zagreb");
        assert_eq!(normalize_location("Splitu").city, "Split");
        assert_eq!(normalize_location("Rijeci").city, "Rijeka");
    }

    #[test]
    fn diacritic_stripped_lookup() {
        assert_eq!(normalize_location("Sibenik").city, "Šibenik");
        assert_eq!(normalize_location("Šibenik").city, "Šibenik");
        assert_eq!(normalize_location("Dakovo").city, "Đakovo");
    }

    #[test]
    fn grad_prefix_stripped() {
        let loc = normalize_location("Grad Zagreb");
        assert_eq!(loc.city, "Zagreb");
        let loc = normalize_location("grad Split, Bačvice");
        assert_eq!(loc.city, "Split");
        assert_eq!(loc.address, "Bačvice");
    }

    #[test]
    fn zagreb_district_implies_city() {
        let loc = normalize_location("Trešnjevka");
        assert_eq!(loc.city, "Zagreb");
        assert_eq!(loc.address, "Trešnjevka");
    }

    #[test]
    fn split_district_implies_city() {
        let loc = normalize_location("Bačvice - Firule");
        assert_eq!(loc.city, "Split");
        assert_eq!(loc.address, "Bačvice, Firule");
    }

    #[test]
    fn city_beats_district_when_both_present() {
        let loc = normalize_location("Zagreb - Jarun");
        assert_eq!(loc.city, "Zagreb");
        assert_eq!(loc.address, "Jarun");
    }

    #[test]
    fn unknown_city_title_cased() {
        let loc = normalize_location("donji miholjac, Kolodvorska 3");
        assert_eq!(loc.city, "Donji Miholjac");
        assert_eq!(loc.address, "Kolodvorska 3");
        assert_eq!(loc.region, None);
    }

    #[test]
    fn empty_input() {
        let loc = normalize_location("   ");
        assert_eq!(loc.city, "");
        assert_eq!(loc.address, "");
    }

    #[test]
    fn en_dash_splits() {
        let loc = normalize_location("Maksimir – Ravnice");
        assert_eq!(loc.city, "Zagreb");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_location("ZG, Trešnjevka");
        let twice = normalize_location(&if once.address.is_empty() {
            once.city.clone()
        } else {
            format!("{}, {}", once.city, once.address)
        });
        assert_eq!(once, twice);
    }

    #[test]
    fn canonical_city_for_queries() {
        assert_eq!(canonical_city("zagrebu"), Some("Zagreb".into()));
        assert_eq!(canonical_city("SPLIT"), Some("Split".into()));
        assert_eq!(canonical_city("Atlantida"), None);
    }

    #[test]
    fn strip_diacritics_maps_all() {
        assert_eq!(strip_diacritics("ČćĐđŠšŽž"), "CcDdSsZz");
        assert_eq!(strip_diacritics("Varaždin"), "Varazdin");
    }
}
