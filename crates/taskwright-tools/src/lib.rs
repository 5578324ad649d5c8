// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
mod registry;
mod tool;
mod validate;
pub mod builtin;

pub use error::ToolError;
pub use registry::{ToolDefinition, ToolRegistry};
pub use tool::{Tool, ToolContext, ToolResult};
pub use validate::{check_cancelled, parse_input, validate_input, wrap};
pub use builtin::{question_bank_tools, QuestionBank};
