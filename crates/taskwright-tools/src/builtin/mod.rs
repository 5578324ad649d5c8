//! Question-bank tools: the reference domain the agent operates on.
pub mod category;
pub mod question;
pub mod store;

use std::sync::Arc;

pub use store::{Category, NewQuestion, Question, QuestionBank};

use crate::Tool;

/// Every question-bank tool, sharing one store.
pub fn question_bank_tools(bank: Arc<QuestionBank>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(category::CreateCategoryTool::new(bank.clone())),
        Arc::new(category::ListCategoriesTool::new(bank.clone())),
        Arc::new(question::CreateQuestionTool::new(bank.clone())),
        Arc::new(question::GetQuestionTool::new(bank.clone())),
        Arc::new(question::ListQuestionsTool::new(bank.clone())),
        Arc::new(question::DeleteQuestionTool::new(bank)),
    ]
}
