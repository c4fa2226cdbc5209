use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Builds a URL-safe slug. Accents are folded away, Cyrillic is
/// transliterated to Latin, everything is lower-cased and runs of
/// non-alphanumerics collapse into a single dash. Letters of other scripts
/// are kept as they are.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = false;

    let folded = input.nfkd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase);
    for ch in folded {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if let Some(latin) = transliterate(ch) {
            slug.push_str(latin);
            last_dash = false;
        } else if ch.is_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.trim_matches('-').to_string()
}

// Decomposed input: й, ё, ї and ў reach here as и, е, і and у.
fn transliterate(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'ґ' => "g",
        'д' => "d",
        'е' => "e",
        'є' => "ie",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'і' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "iu",
        'я' => "ia",
        'ß' => "ss",
        'æ' => "ae",
        'ø' => "o",
        'œ' => "oe",
        'ł' => "l",
        'đ' => "d",
        'þ' => "th",
        _ => return None,
    };
    Some(latin)
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn latin_text_is_lowercased_and_dashed() {
        assert_eq!(slugify("United States"), "united-states");
        assert_eq!(slugify("  Sci-Fi & Fantasy!  "), "sci-fi-fantasy");
    }

    #[test]
    fn cyrillic_is_transliterated() {
        assert_eq!(slugify("Франция"), "frantsiia");
        assert_eq!(slugify("Русский язык"), "russkii-iazyk");
        assert_eq!(slugify("Ёлки"), "elki");
    }

    #[test]
    fn accented_latin_keeps_its_letters() {
        assert_eq!(slugify("Côte d'Ivoire"), "cote-d-ivoire");
        assert_eq!(slugify("España"), "espana");
        assert_eq!(slugify("Curaçao"), "curacao");
        assert_eq!(slugify("Straße"), "strasse");
        assert_eq!(slugify("Polska Łódź"), "polska-lodz");
    }

    #[test]
    fn ukrainian_and_belarusian_letters_survive() {
        assert_eq!(slugify("Україна"), "ukraina");
        assert_eq!(slugify("Європа"), "ievropa");
        assert_eq!(slugify("Ґанок"), "ganok");
        assert_eq!(slugify("Беларусь"), "belarus");
        assert_eq!(slugify("Ўсход"), "uskhod");
    }

    #[test]
    fn other_scripts_are_not_dropped() {
        assert_eq!(slugify("日本"), "日本");
        assert_eq!(slugify("Ελλάδα"), "ελλαδα");
    }

    #[test]
    fn punctuation_only_yields_empty_slug() {
        assert_eq!(slugify("--- !!"), "");
    }
}
