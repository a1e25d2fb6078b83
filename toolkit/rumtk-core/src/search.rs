
pub mod rumtk_search {
    use regex::Regex;
    use crate::cache::{new_cache, AHashMap, LazyRUMCache};
    use crate::strings::{CompactStringExt, RUMString};

    /**************************** Globals **************************************/
    static regex_cache: RegexCache = new_cache();

    /**************************** Constants**************************************/

    /**************************** Types *****************************************/
    pub type RegexCache = LazyRUMCache<RUMString, Regex>;
    pub type SearchGroups = AHashMap<RUMString, RUMString>;
    pub type CapturedList = Vec<RUMString>;

    /**************************** Traits ****************************************/

    /**************************** Helpers ***************************************/

    ///
    /// Fetches a compiled [Regex] for `expr` from the shared cache, compiling and storing it on
    /// first use. Regex compilation is the expensive part of every search call here, so every
    /// caller in this module routes through this helper instead of calling `Regex::new` directly.
    ///
    fn get_or_set_regex_from_cache(expr: &str) -> Regex {
        regex_cache.get_or_insert_with(RUMString::from(expr), |key| compile_regex(key.as_str()))
    }

    ///
    /// # Panics
    /// Panics if `expr` is not a syntactically valid regular expression. Every call site in this
    /// module is expected to pass a compile-time-known pattern; a malformed pattern is a
    /// programmer error, not a runtime condition to recover from.
    ///
    fn compile_regex(expr: &str) -> Regex {
        Regex::new(expr).unwrap_or_else(|why| panic!("Invalid regular expression '{}': {}", expr, why))
    }

    ///
    /// Run `expr` against `input` and collect its *named* capture groups into a map keyed by
    /// group name. Groups that never matched (or matched empty) keep `default` as their value.
    ///
    pub fn string_search_captures(input: &str, expr: &str, default: &str) -> SearchGroups {
        let re = get_or_set_regex_from_cache(expr);
        let names: Vec<&str> = re.capture_names().skip(1).map(|x| x.unwrap_or("")).collect();
        let mut clean_names: Vec<&str> = Vec::with_capacity(names.len());
        let mut groups = SearchGroups::default();

        for name in &names {
            if name.len() > 0 {
                clean_names.push(name);
            }
        }

        if clean_names.len() == 0 {
            return groups;
        }

        for name in &clean_names {
            groups.insert(RUMString::from(*name), RUMString::from(default));
        }

        for cap in re.captures_iter(input) {
            for name in &clean_names {
                let val = cap.name(name).map_or("", |s| s.as_str());
                if val.len() > 0 {
                    groups.insert(RUMString::from(*name), RUMString::from(val));
                }
            }
        }

        groups
    }

    ///
    /// Alias of [string_search_captures] kept under its more explicit name for call sites that
    /// want to make clear they are after named groups specifically (as opposed to
    /// [string_search_all_captures]'s positional groups).
    ///
    pub fn string_search_named_captures(input: &str, expr: &str, default: &str) -> SearchGroups {
        string_search_captures(input, expr, default)
    }

    ///
    /// Run `expr` against `input` and collect every (unnamed or named) capture group from every
    /// match, in order, ignoring the implicit whole-match group 0. A group that didn't
    /// participate in a given match contributes `default` instead of being skipped, so the
    /// output always has `matches * (capture group count)` entries.
    ///
    pub fn string_search_all_captures<'t>(input: &'t str, expr: &str, default: &'t str) -> Vec<&'t str> {
        let re = get_or_set_regex_from_cache(expr);
        let mut captured: Vec<&str> = Vec::new();
        for caps in re.captures_iter(input) {
            for i in 1..caps.len() {
                match caps.get(i) {
                    Some(m) => captured.push(m.as_str()),
                    None => captured.push(default),
                }
            }
        }
        captured
    }

    pub fn string_list(input: &str, re: &Regex) -> CapturedList {
        let mut list: Vec<RUMString> = Vec::default();
        for itm in re.find_iter(input) {
            list.push(RUMString::from(itm.as_str()));
        }
        list
    }

    pub fn string_search(input: &str, expr: &str, join_pattern: &str) -> RUMString {
        let re = get_or_set_regex_from_cache(expr);
        string_list(input, &re).join_compact(join_pattern)
    }
}
