//! Process exit-code convention for plugin runners.
//!
//! The supervisor maps a runner's exit status to a terminal session state:
//! `0` after a reported finish is FINISHED, [`EXIT_CODE_ABORTED`] is ABORTED,
//! and [`EXIT_CODE_FAILED`], any other code, or death by signal is FAILED.

/// Plugin completed and reported finish.
pub const EXIT_CODE_SUCCESS: i32 = 0;
/// Plugin gave up deliberately (user stop, unusable target).
pub const EXIT_CODE_ABORTED: i32 = 1;
/// Plugin failed, usually on an unexpected error.
pub const EXIT_CODE_FAILED: i32 = 2;
