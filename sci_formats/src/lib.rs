pub mod layout;
pub mod resource;
pub mod script;
pub mod span;
pub mod version;
pub mod vocab;

pub use layout::{
    Layout3, Layout11to21, LayoutPre11, MethodEntry, NO_CLASS, OBJECT_MAGIC, ObjectLayout,
    ParsedObjectHeader, VarSelectors,
};
pub use resource::{ResourceDir, ResourceId, ResourceType};
pub use script::{
    LocalsBlock, ObjectRecord, Relocations, ScriptImage, ScriptResource, Sci3Relocation,
    scan_script,
};
pub use span::{ByteSpan, SpanError};
pub use version::{Endian, LayoutKind, SciVersion};
pub use vocab::{CLASS_VOCAB, SELECTOR_VOCAB, decode_class_scripts, decode_selector_names};
