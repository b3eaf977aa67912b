mod captured_request;
mod category;
mod checklist_state;
mod observed_call;

pub use captured_request::*;
pub use category::*;
pub use checklist_state::*;
pub use observed_call::*;
