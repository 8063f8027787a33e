use std::sync::LazyLock;

use regex::Regex;

static SEASON_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\s*-\s*)?\d{4}\sSeason(?:\s\d+)?").expect("valid season regex")
});

static FIXED_FIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Fixed\s(?:-\s)?Fixed").expect("valid fixed regex"));

/// Shorten a platform season name for display and for the register command.
///
/// Drops the `"2024 Season 2"` suffix and collapses the doubled words the
/// platform produces for fixed-setup and "Series" names.
pub fn format_season_name(raw: &str) -> String {
    let name = SEASON_SUFFIX.replace(raw, "");
    let name = FIXED_FIXED.replace(&name, "Fixed");
    name.replacen("Series Series", "Series", 1).trim().to_string()
}
