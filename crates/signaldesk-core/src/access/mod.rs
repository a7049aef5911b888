//! Console PIN gate and route guard.

mod guard;
mod pin;

pub use guard::{classify, GuardDecision, RouteGuard, RouteKind, UserSession, SIGNIN_PATH};
pub use pin::{normalize_pin_input, AccessError, PinGate, Role, PIN_LENGTH};
