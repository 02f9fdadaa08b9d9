/// Env-gated diagnostics for algorithm discovery. Enable with
/// `CONVGRAD_ALGO_LOG=1`; off by default so the hot path stays silent.
#[macro_export]
macro_rules! algo_log {
    ($($arg:tt)*) => {{
        if std::env::var("CONVGRAD_ALGO_LOG").ok().as_deref() == Some("1") {
            eprintln!("[convgrad] {}", format!($($arg)*));
        }
    }};
}
