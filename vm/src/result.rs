use object::ValBox;

/// Value produced when a frame finishes.
///
/// `Void` is legal only for statements; expression boundaries coerce
/// it into an exception naming the offending sub-syntax.
#[derive(Debug, Clone, Copy)]
pub enum EvalResult {
    Value(ValBox),
    Void,
    /// Internal invariant violation; fatal, propagates unconditionally.
    Error,
    /// Recoverable exception data travelling the frame spine.
    Exc {
        raising_frame: ValBox,
        exception: ValBox,
    },
}

impl EvalResult {
    pub fn is_value(&self) -> bool {
        matches!(self, EvalResult::Value(_))
    }

    pub fn is_abrupt(&self) -> bool {
        matches!(self, EvalResult::Error | EvalResult::Exc { .. })
    }
}

/// Value produced when a native handler returns.
///
/// `Continue` redirects the trampoline to a new frame, typically a
/// freshly allocated child that re-enters the native through a
/// resume frame when it resolves.
#[derive(Debug, Clone, Copy)]
pub enum CallResult {
    Value(ValBox),
    Void,
    Error,
    Exc {
        raising_frame: ValBox,
        exception: ValBox,
    },
    Continue(ValBox),
}

/// Outcome of stepping or resolving a frame.
#[derive(Debug, Clone, Copy)]
pub enum StepResult {
    /// The new top frame (possibly the same frame in a new state).
    Continue(ValBox),
    /// Fatal; the trampoline stops.
    Error,
}

/// Evaluate an allocating expression inside a function returning
/// [`StepResult`]; allocation failure aborts the step.
macro_rules! try_step {
    ($cx:expr, $expr:expr) => {
        match $expr {
            Some(v) => v,
            None => {
                $cx.set_internal_error("allocation failed");
                return $crate::result::StepResult::Error;
            }
        }
    };
}

/// As [`try_step!`] for functions returning [`CallResult`].
macro_rules! try_call {
    ($cx:expr, $expr:expr) => {
        match $expr {
            Some(v) => v,
            None => {
                $cx.set_internal_error("allocation failed");
                return $crate::result::CallResult::Error;
            }
        }
    };
}

pub(crate) use {try_call, try_step};
