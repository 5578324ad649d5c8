// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ToolError;

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: String,
    #[serde(skip)]
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: String,
    #[serde(skip)]
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// 1 (easy) to 5 (hard)
    pub difficulty: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a question.
#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub category_id: Option<String>,
    pub text: String,
    pub answer: Option<String>,
    pub difficulty: u8,
    pub tags: Vec<String>,
}

/// In-memory question bank.  Every record carries its owner and every
/// accessor takes the caller's user id; a record owned by someone else is
/// indistinguishable from one that does not exist.
#[derive(Default)]
pub struct QuestionBank {
    categories: RwLock<HashMap<String, Category>>,
    questions: RwLock<HashMap<String, Question>>,
}

impl QuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_category(
        &self,
        owner: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Category, ToolError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::InvalidInput("category name must not be empty".into()));
        }
        let mut cats = self.categories.write().await;
        if cats
            .values()
            .any(|c| c.owner_id == owner && c.name.eq_ignore_ascii_case(name))
        {
            return Err(ToolError::InvalidInput(format!("category '{name}' already exists")));
        }
        let cat = Category {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            name: name.to_string(),
            description,
            created_at: Utc::now(),
        };
        cats.insert(cat.id.clone(), cat.clone());
        Ok(cat)
    }

    pub async fn list_categories(&self, owner: &str) -> Vec<Category> {
        let cats = self.categories.read().await;
        let mut out: Vec<Category> = cats.values().filter(|c| c.owner_id == owner).cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    async fn owned_category(&self, owner: &str, id: &str) -> Result<Category, ToolError> {
        self.categories
            .read()
            .await
            .get(id)
            .filter(|c| c.owner_id == owner)
            .cloned()
            .ok_or_else(|| ToolError::not_found("category", id))
    }

    pub async fn create_question(&self, owner: &str, new: NewQuestion) -> Result<Question, ToolError> {
        if new.text.trim().is_empty() {
            return Err(ToolError::InvalidInput("question text must not be empty".into()));
        }
        if !(1..=5).contains(&new.difficulty) {
            return Err(ToolError::InvalidInput("difficulty must be between 1 and 5".into()));
        }
        if let Some(cat) = &new.category_id {
            self.owned_category(owner, cat).await?;
        }
        let q = Question {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            category_id: new.category_id,
            text: new.text.trim().to_string(),
            answer: new.answer,
            difficulty: new.difficulty,
            tags: new.tags,
            created_at: Utc::now(),
        };
        self.questions.write().await.insert(q.id.clone(), q.clone());
        Ok(q)
    }

    pub async fn get_question(&self, owner: &str, id: &str) -> Result<Question, ToolError> {
        self.questions
            .read()
            .await
            .get(id)
            .filter(|q| q.owner_id == owner)
            .cloned()
            .ok_or_else(|| ToolError::not_found("question", id))
    }

    /// Questions owned by `owner`, oldest first, optionally restricted to one
    /// category.
    pub async fn list_questions(
        &self,
        owner: &str,
        category_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Question>, ToolError> {
        if let Some(cat) = category_id {
            self.owned_category(owner, cat).await?;
        }
        let qs = self.questions.read().await;
        let mut out: Vec<Question> = qs
            .values()
            .filter(|q| q.owner_id == owner)
            .filter(|q| category_id.map_or(true, |c| q.category_id.as_deref() == Some(c)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out.truncate(limit);
        Ok(out)
    }

    pub async fn delete_question(&self, owner: &str, id: &str) -> Result<(), ToolError> {
        let mut qs = self.questions.write().await;
        match qs.get(id) {
            Some(q) if q.owner_id == owner => {
                qs.remove(id);
                Ok(())
            }
            _ => Err(ToolError::not_found("question", id)),
        }
    }
}
