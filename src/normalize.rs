//! Lookup keys for names and emails.
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case- and diacritic-insensitive key: "Álbum  Clássico" -> "album classico".
pub fn name_key(input: &str) -> String {
    let folded: String = input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn email_key(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Remove duplicate names (by `name_key`), keeping the first spelling seen.
pub fn dedup_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name_key(name)) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_accents_and_spacing() {
        assert_eq!(name_key("Álbum  Clássico "), "album classico");
        assert_eq!(name_key("ENTREGA"), name_key("entrega"));
        assert_eq!(name_key("Fotolivro Açaí"), "fotolivro acai");
    }

    #[test]
    fn email_key_trims_and_lowercases() {
        assert_eq!(email_key("  Ana@Studio.COM "), "ana@studio.com");
    }

    #[test]
    fn dedup_keeps_first_spelling() {
        let names = dedup_names(["Album A", "álbum a", "", "Quadro"]);
        assert_eq!(names, vec!["Album A".to_string(), "Quadro".to_string()]);
    }
}
