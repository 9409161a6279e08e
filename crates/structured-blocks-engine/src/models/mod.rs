pub mod descriptor;
pub mod event;
pub mod instance;

pub use descriptor::{BlockDescriptor, descriptors_from_json};
pub use event::ChangeEvent;
pub use instance::{BlockInstance, BlockKind, MAIN_SLOT, Properties, PropertyValue, Slots, Uid};
