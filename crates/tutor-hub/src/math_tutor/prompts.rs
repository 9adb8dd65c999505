//! Prompt text, output schemas and reply parsing for the math tutor.

use serde_json::{json, Value};

use super::knowledge;
use super::types::{Difficulty, MathDomain};
use crate::conversation_db::{MathSolution, Message, MessageContent, Role};
use crate::llm::{ChatMessage, OutputSchema};

pub const SOLVE_MAX_TOKENS: u32 = 3500;
pub const EXPLAIN_MAX_TOKENS: u32 = 3000;
pub const TITLE_MAX_TOKENS: u32 = 40;
pub const CLASSIFIER_MAX_TOKENS: u32 = 200;
pub const TEMPERATURE: f32 = 0.2;

pub const FALLBACK_TITLE: &str = "數學問題";
pub const TITLE_SYSTEM_PROMPT: &str = "你是一個標題生成器。請為以下的數學問題生成一個簡潔、不超過15個字的中文標題。只輸出標題。";

const TEXT_CLASSIFIER_PROMPT: &str = "判斷使用者輸入是否為合理的數學問題（寬鬆判定：計算、證明、應用題、概念提問皆算）。\
     以 is_reasonable_math_question 回答，並在 reason 中簡述理由。";
const IMAGE_CLASSIFIER_PROMPT: &str = "判斷圖片中是否包含數學題目（算式、圖形、函數圖表或文字題皆算）。以 is_math 回答，並在 reason 中簡述理由。";
const ANSWER_SYSTEM_PROMPT: &str = "你是一位專業的數學教師。根據先前的解題紀錄，以繁體中文清楚回答學生的追問，必要時引用對應的解題步驟。";

fn concepts_section(domain: Option<MathDomain>) -> String {
    let Some(domain) = domain else {
        return String::new();
    };
    let mut text = String::from("\n\n相關數學概念：\n");
    for (section, concepts) in knowledge::sections(domain) {
        text.push_str(section);
        text.push_str(":\n");
        for concept in concepts.iter() {
            text.push_str("- ");
            text.push_str(concept);
            text.push('\n');
        }
    }
    text
}

pub fn solver_system_prompt(domain: Option<MathDomain>) -> String {
    format!(
        "你是一位專業的高中數學教師。請以條列式步驟解題，說明每一步的推理，\
         優先使用巧妙的方法而非硬算，並指出關鍵洞察。\
         若輸入不是數學題目，將 is_math_question 設為 false。{}",
        concepts_section(domain)
    )
}

pub fn image_system_prompt(domain: Option<MathDomain>) -> String {
    format!(
        "你是一位專業的高中數學教師，擅長從圖片中識別並解決數學問題。\
         先在 problem 欄位完整轉錄圖片中的題目，再以條列式步驟解題。\
         若圖片中沒有數學題目，將 is_math_question 設為 false。{}",
        concepts_section(domain)
    )
}

/// The optional hints shared by text and image problems.
pub struct ProblemHints<'a> {
    pub domain: Option<MathDomain>,
    pub difficulty: Option<Difficulty>,
    pub concepts: &'a [String],
    pub context: Option<&'a str>,
}

impl ProblemHints<'_> {
    fn render(&self) -> String {
        let mut text = String::new();
        if let Some(domain) = self.domain {
            text.push_str(&format!("\n\n數學領域：{}", domain));
        }
        if let Some(difficulty) = self.difficulty {
            text.push_str(&format!("\n難度等級：{}", difficulty));
        }
        if !self.concepts.is_empty() {
            text.push_str(&format!("\n涉及概念：{}", self.concepts.join(", ")));
        }
        if let Some(context) = self.context.map(str::trim).filter(|c| !c.is_empty()) {
            text.push_str(&format!("\n額外說明：{}", context));
        }
        text
    }
}

pub fn solve_user_prompt(problem: &str, hints: &ProblemHints<'_>) -> String {
    format!("請解決以下數學問題：\n\n{}{}", problem, hints.render())
}

pub fn image_user_prompt(hints: &ProblemHints<'_>) -> String {
    format!("請分析這張圖片中的數學問題並提供詳細解答。{}", hints.render())
}

pub fn concept_system_prompt(context: &str) -> String {
    format!(
        "你是一位高中數學教師。請以易懂的方式解釋學生詢問的數學概念，列出關鍵要點與應用例子。\n\n\
         知識庫資料：\n{}",
        context
    )
}

pub fn concept_user_prompt(name: &str) -> String {
    format!("請解釋數學概念：{}", name)
}

pub fn classifier_messages(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(TEXT_CLASSIFIER_PROMPT), ChatMessage::user(text)]
}

pub fn image_classifier_messages(data_url: &str, context: Option<&str>) -> Vec<ChatMessage> {
    let text = context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("Classify whether this image contains a math problem.");
    vec![
        ChatMessage::system(IMAGE_CLASSIFIER_PROMPT),
        ChatMessage::user(text).with_image(data_url),
    ]
}

/// Prior turns for a follow-up question, with solutions summarized.
pub fn question_messages(history: &[Message], question: String) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(ANSWER_SYSTEM_PROMPT));
    for message in history {
        let text = match &message.content {
            MessageContent::Solution(solution) => format!(
                "你對問題 '{}' 給出了詳細解答，最終答案：{}",
                solution.problem, solution.final_answer
            ),
            other => other.text().to_string(),
        };
        if text.trim().is_empty() {
            continue;
        }
        messages.push(match message.role {
            Role::User => ChatMessage::user(text),
            Role::Assistant => ChatMessage::assistant(text),
        });
    }
    messages.push(ChatMessage::user(question));
    messages
}

/// The question, annotated with the referenced step and any context.
pub fn annotate_question(
    question: &str,
    step_number: Option<u32>,
    last_solution: Option<&MathSolution>,
    context: Option<&str>,
) -> String {
    let mut text = question.trim().to_string();
    let step = step_number.zip(last_solution).and_then(|(n, solution)| {
        let index = usize::try_from(n).ok()?.checked_sub(1)?;
        solution.steps.get(index).map(|step| (n, step))
    });
    if let Some((n, step)) = step {
        text.push_str(&format!(" (針對步驟 {}：'{}')", n, step.description));
    }
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        text.push_str(&format!(" (背景：{})", context));
    }
    text
}

pub fn clean_title(raw: &str) -> String {
    let title: String = raw.trim().chars().filter(|c| *c != '"' && *c != '\'').collect();
    let title = title.trim();
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title.to_string()
    }
}

pub fn solution_schema() -> OutputSchema {
    let step = json!({
        "type": "object",
        "properties": {
            "step_number": {"type": "integer"},
            "description": {"type": "string"},
            "reasoning": {"type": "string"},
            "calculation": {"type": "string"},
            "key_insight": {"type": "string"}
        },
        "required": ["step_number", "description", "reasoning", "calculation", "key_insight"],
        "additionalProperties": false
    });
    OutputSchema {
        name: "math_solution".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "is_math_question": {"type": "boolean"},
                "problem": {"type": "string"},
                "domain": {"type": "string"},
                "relevant_concepts": {"type": "array", "items": {"type": "string"}},
                "solution_approach": {"type": "string"},
                "steps": {"type": "array", "minItems": 1, "items": step},
                "final_answer": {"type": "string"},
                "verification": {"type": "string"},
                "alternative_methods": {"type": "array", "items": {"type": "string"}}
            },
            "required": [
                "is_math_question", "problem", "domain", "relevant_concepts", "solution_approach",
                "steps", "final_answer", "verification", "alternative_methods"
            ],
            "additionalProperties": false
        }),
    }
}

pub fn concept_schema() -> OutputSchema {
    OutputSchema {
        name: "explain_math_concept".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "concept_name": {"type": "string"},
                "domain": {"type": "string"},
                "explanation": {"type": "string"},
                "key_points": {"type": "array", "items": {"type": "string"}},
                "examples": {"type": "array", "items": {"type": "string"}},
                "additional_context": {"type": "string"}
            },
            "required": ["concept_name", "domain", "explanation", "key_points", "examples", "additional_context"],
            "additionalProperties": false
        }),
    }
}

pub fn text_classifier_schema() -> OutputSchema {
    OutputSchema {
        name: "reasonable_math_check".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "is_reasonable_math_question": {"type": "boolean"},
                "reason": {"type": "string"}
            },
            "required": ["is_reasonable_math_question", "reason"],
            "additionalProperties": false
        }),
    }
}

pub fn image_classifier_schema() -> OutputSchema {
    OutputSchema {
        name: "image_is_math".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "is_math": {"type": "boolean"},
                "reason": {"type": "string"}
            },
            "required": ["is_math", "reason"],
            "additionalProperties": false
        }),
    }
}

/// A classifier verdict; `None` when the reply lacks the boolean field.
pub fn parse_verdict(value: &Value, field: &str) -> Option<(bool, String)> {
    let map = value.as_object()?;
    let verdict = map.get(field)?.as_bool()?;
    let reason = map.get("reason").and_then(Value::as_str).unwrap_or_default().to_string();
    Some((verdict, reason))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolutionReply {
    Solved(MathSolution),
    NotMath,
    Unusable(String),
}

pub fn parse_solution(value: &Value) -> SolutionReply {
    if value.get("is_math_question").and_then(Value::as_bool) == Some(false) {
        return SolutionReply::NotMath;
    }
    match serde_json::from_value::<MathSolution>(value.clone()) {
        Ok(solution) if !solution.final_answer.trim().is_empty() => SolutionReply::Solved(solution),
        Ok(_) => SolutionReply::Unusable("solution has no final answer".to_string()),
        Err(e) => SolutionReply::Unusable(e.to_string()),
    }
}
