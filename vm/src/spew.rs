/// Low-tech interpreter tracing, enabled by `WHISPER_SPEW=1`.
/// Diagnostics only; never part of the core semantics.
pub fn spew_enabled_from_env() -> bool {
    std::env::var("WHISPER_SPEW").map(|v| v == "1").unwrap_or(false)
}

macro_rules! spew {
    ($cx:expr, $($arg:tt)*) => {
        if $cx.state.spew_enabled {
            eprintln!("[whisper] {}", format_args!($($arg)*));
        }
    };
}

pub(crate) use spew;
