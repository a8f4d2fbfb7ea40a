pub mod conversation;
pub mod intent;
pub mod slot;

pub use conversation::{ConversationState, SlotDraft};
pub use intent::{ConfirmationPolicy, DateTimeParam, IntentKind, ResolvedIntent};
pub use slot::{Doctor, Slot, SlotStatus, SLOT_DATETIME_FORMAT};
