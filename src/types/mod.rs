//! Shared value types

pub mod message;
pub mod meta;
pub mod output;
pub mod request;
pub mod response;

pub use message::{
    ChatMessage, ContentPart, ImageUrl, Instruction, RawInstruction, Role, process_input,
};
pub use meta::ModelMeta;
pub use output::{OutputPayload, SingleOutput, SingleOutputMeta, StreamOutputs};
pub use request::ChatRequest;
pub use response::{ChatOutcome, Content, ResponseMetadata, StreamHandle};
