use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// `KVERIFY_QUIET=1` (or `true`) suppresses the success banner
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("KVERIFY_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
