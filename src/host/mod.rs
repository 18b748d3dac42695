//! Host side: the agent loop and the streaming request scanner

pub mod host;
pub mod scanner;

pub use host::{ ChatMessage, Host, HostConfig, LanguageModel, MessageStore, StreamOutcome };
pub use scanner::{ StreamScanner, find_json_objects };
