// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::store::{NewQuestion, QuestionBank};
use crate::{check_cancelled, parse_input, wrap, Tool, ToolContext, ToolError, ToolResult};

const DEFAULT_LIST_LIMIT: usize = 50;

pub struct CreateQuestionTool {
    bank: Arc<QuestionBank>,
}

impl CreateQuestionTool {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self { bank }
    }
}

#[derive(Deserialize)]
struct CreateQuestionArgs {
    text: String,
    category_id: Option<String>,
    answer: Option<String>,
    difficulty: Option<u8>,
    #[serde(default)]
    tags: Vec<String>,
}

#[async_trait]
impl Tool for CreateQuestionTool {
    fn name(&self) -> &str {
        "create_question"
    }

    fn description(&self) -> &str {
        "Create a question, optionally inside one of the caller's categories. \
         Difficulty ranges from 1 (easy) to 5 (hard) and defaults to 3."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The question itself" },
                "category_id": { "type": "string", "description": "Id from list_categories or create_category" },
                "answer": { "type": "string", "description": "Reference answer" },
                "difficulty": { "type": "integer", "minimum": 1, "maximum": 5 },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(user_id = %ctx.user_id, "create_question tool");
        let outcome = async {
            check_cancelled(ctx)?;
            let args: CreateQuestionArgs = parse_input(&self.input_schema(), input)?;
            let new = NewQuestion {
                category_id: args.category_id,
                text: args.text,
                answer: args.answer,
                difficulty: args.difficulty.unwrap_or(3),
                tags: args.tags,
            };
            self.bank.create_question(&ctx.user_id, new).await
        }
        .await;
        wrap(outcome)
    }
}

#[derive(Deserialize)]
struct QuestionIdArgs {
    question_id: String,
}

fn question_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "question_id": { "type": "string" }
        },
        "required": ["question_id"],
        "additionalProperties": false
    })
}

pub struct GetQuestionTool {
    bank: Arc<QuestionBank>,
}

impl GetQuestionTool {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl Tool for GetQuestionTool {
    fn name(&self) -> &str {
        "get_question"
    }

    fn description(&self) -> &str {
        "Fetch one of the caller's questions by id."
    }

    fn input_schema(&self) -> Value {
        question_id_schema()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let outcome = async {
            check_cancelled(ctx)?;
            let args: QuestionIdArgs = parse_input(&self.input_schema(), input)?;
            self.bank.get_question(&ctx.user_id, &args.question_id).await
        }
        .await;
        wrap(outcome)
    }
}

pub struct ListQuestionsTool {
    bank: Arc<QuestionBank>,
}

impl ListQuestionsTool {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self { bank }
    }
}

#[derive(Deserialize)]
struct ListQuestionsArgs {
    category_id: Option<String>,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ListQuestionsTool {
    fn name(&self) -> &str {
        "list_questions"
    }

    fn description(&self) -> &str {
        "List the caller's questions, oldest first. Filter by category_id and \
         cap the number returned with limit (default 50)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category_id": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 500 }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let outcome = async {
            check_cancelled(ctx)?;
            let args: ListQuestionsArgs = parse_input(&self.input_schema(), input)?;
            self.bank
                .list_questions(
                    &ctx.user_id,
                    args.category_id.as_deref(),
                    args.limit.unwrap_or(DEFAULT_LIST_LIMIT),
                )
                .await
        }
        .await;
        wrap(outcome)
    }
}

pub struct DeleteQuestionTool {
    bank: Arc<QuestionBank>,
}

impl DeleteQuestionTool {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl Tool for DeleteQuestionTool {
    fn name(&self) -> &str {
        "delete_question"
    }

    fn description(&self) -> &str {
        "Permanently delete one of the caller's questions by id."
    }

    fn input_schema(&self) -> Value {
        question_id_schema()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let outcome = async {
            check_cancelled(ctx)?;
            let args: QuestionIdArgs = parse_input(&self.input_schema(), input)?;
            self.bank.delete_question(&ctx.user_id, &args.question_id).await?;
            debug!(user_id = %ctx.user_id, question_id = %args.question_id, "question deleted");
            Ok::<_, ToolError>(json!({ "deleted": args.question_id }))
        }
        .await;
        wrap(outcome)
    }
}
