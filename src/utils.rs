/// File-name slug for a style name: lowercased, whitespace collapsed to
/// underscores, punctuation that downloads badly removed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_separator = true;
    for c in name.chars() {
        match c.to_ascii_lowercase() {
            '*' | '-' | '+' | '~' | '.' | '(' | ')' | '\'' | '"' | '!' | ':' => {}
            c if c.is_whitespace() => {
                if !last_was_separator {
                    slug.push('_');
                    last_was_separator = true;
                }
            }
            c => {
                slug.push(c);
                last_was_separator = false;
            }
        }
    }
    if slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_replaces_spaces() {
        assert_eq!(slugify("OSM Liberty"), "osm_liberty");
    }

    #[test]
    fn drops_punctuation() {
        assert_eq!(slugify("Dark Matter (v2)!"), "dark_matter_v2");
        assert_eq!(slugify("basic-preview"), "basicpreview");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(slugify("  My   Style  "), "my_style");
    }
}
