use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::store::QuestionBank;
use crate::{check_cancelled, parse_input, wrap, Tool, ToolContext, ToolError, ToolResult};

pub struct CreateCategoryTool {
    bank: Arc<QuestionBank>,
}

impl CreateCategoryTool {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self { bank }
    }
}

#[derive(Deserialize)]
struct CreateCategoryArgs {
    name: String,
    description: Option<String>,
}

#[async_trait]
impl Tool for CreateCategoryTool {
    fn name(&self) -> &str {
        "create_category"
    }

    fn description(&self) -> &str {
        "Create a question category. Names are unique per user (case-insensitive). \
         Returns the new category including its id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Display name of the category" },
                "description": { "type": "string", "description": "Optional longer description" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(user_id = %ctx.user_id, "create_category tool");
        let outcome = async {
            check_cancelled(ctx)?;
            let args: CreateCategoryArgs = parse_input(&self.input_schema(), input)?;
            self.bank.create_category(&ctx.user_id, &args.name, args.description).await
        }
        .await;
        wrap(outcome)
    }
}

pub struct ListCategoriesTool {
    bank: Arc<QuestionBank>,
}

impl ListCategoriesTool {
    pub fn new(bank: Arc<QuestionBank>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl Tool for ListCategoriesTool {
    fn name(&self) -> &str {
        "list_categories"
    }

    fn description(&self) -> &str {
        "List the caller's question categories, sorted by name."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let outcome = async {
            check_cancelled(ctx)?;
            crate::validate_input(&self.input_schema(), &input)?;
            Ok::<_, ToolError>(self.bank.list_categories(&ctx.user_id).await)
        }
        .await;
        wrap(outcome)
    }
}
