pub mod message_content;
pub mod message_view;

pub use message_content::{CategoricalAnalysis, MessageContent, NumericalAnalysis};
pub use message_view::{Block, Table, format_relative_date, render};
