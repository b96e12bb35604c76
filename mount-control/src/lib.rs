//! Control loops and capture supervision for the mount tracker.
//!
//! Three periodic loops share one [`shared::state::SharedState`] record:
//! the motor loop applies motion commands to the drive electronics, the
//! tracking loop turns captured frames into motion commands, and the
//! capture supervisor keeps the recorder subprocess healthy and rotates
//! its output segments. Any of them can raise the shared abort flag; all
//! of them poll it at the top of every tick and unwind.

pub mod capture;
pub mod grab;
pub mod motor;
pub mod run;
pub mod tracking;
