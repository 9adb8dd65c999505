use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::knowledge;
use super::prompts::{self, ProblemHints, SolutionReply};
use super::types::*;
use crate::conversation_db::{now_timestamp, MathSolution, Message, MessageContent, Partition, SearchQuery, SessionMetadata};
use crate::error::TutorError;
use crate::llm::{ChatBackend, ChatMessage, CompletionRequest};
use crate::memory::SessionRecord;
use crate::metrics;
use crate::model_registry::{ModelRegistry, FEATURE_MATH};
use crate::session_engine::SessionController;

/// Math problem solving, follow-up questions and concept explanations.
///
/// Math sessions live in the same conversation store as language practice,
/// tagged with the `math` feature, and go through the controller's commit.
#[derive(Clone)]
pub struct MathTutor {
    sessions: SessionController,
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ModelRegistry>,
}

fn not_math(reason: &str) -> TutorError {
    let reason = reason.trim();
    if reason.is_empty() {
        TutorError::Validation("[NOT_MATH] This is not a math problem".to_string())
    } else {
        TutorError::Validation(format!("[NOT_MATH] This is not a math problem: {}", reason))
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, TutorError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TutorError::Validation(format!("{} must not be empty", what)));
    }
    Ok(value)
}

impl MathTutor {
    pub fn new(sessions: SessionController, backend: Arc<dyn ChatBackend>, registry: Arc<ModelRegistry>) -> Self {
        Self { sessions, backend, registry }
    }

    pub fn model(&self) -> String {
        self.registry.resolve_llm(FEATURE_MATH, None)
    }

    fn request(&self, model: &str, messages: Vec<ChatMessage>, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            messages,
            max_tokens,
            temperature: prompts::TEMPERATURE,
        }
    }

    pub async fn solve(&self, problem: MathProblem) -> Result<SolvedProblem, TutorError> {
        let text = required(&problem.problem, "Problem text")?;
        let domain = parse_optional::<MathDomain>(problem.domain.as_deref())?;
        let difficulty = parse_optional::<Difficulty>(problem.difficulty.as_deref())?;
        if let Some(sid) = problem.session_id.as_deref() {
            SessionController::validate_sid(sid)?;
        }
        let model = self.model();

        let check = self.request(&model, prompts::classifier_messages(text), prompts::CLASSIFIER_MAX_TOKENS);
        if let Some((false, reason)) = self.classify(&check, &prompts::text_classifier_schema(), "is_reasonable_math_question").await {
            return Err(not_math(&reason));
        }

        let hints = ProblemHints { domain, difficulty, concepts: &problem.specific_concepts, context: None };
        let messages = vec![
            ChatMessage::system(prompts::solver_system_prompt(domain)),
            ChatMessage::user(prompts::solve_user_prompt(text, &hints)),
        ];
        let solution = self.solve_with(&model, messages).await?;
        let session_id = self
            .record_solution(problem.session_id, text.to_string(), solution.clone(), &hints, &model)
            .await?;
        Ok(SolvedProblem { session_id, solution })
    }

    /// Solve the problem shown in an uploaded image.
    pub async fn solve_image(
        &self,
        image: &[u8],
        content_type: &str,
        problem: ImageProblem,
    ) -> Result<SolvedProblem, TutorError> {
        if !content_type.trim().starts_with("image/") {
            return Err(TutorError::Validation("Please upload a valid image file".to_string()));
        }
        if image.is_empty() {
            return Err(TutorError::Validation("Image must not be empty".to_string()));
        }
        let domain = parse_optional::<MathDomain>(problem.domain.as_deref())?;
        let difficulty = parse_optional::<Difficulty>(problem.difficulty.as_deref())?;
        if let Some(sid) = problem.session_id.as_deref() {
            SessionController::validate_sid(sid)?;
        }
        let model = self.model();
        let data_url = format!("data:{};base64,{}", content_type.trim(), STANDARD.encode(image));

        let context = problem.additional_context.as_deref();
        let check = self.request(
            &model,
            prompts::image_classifier_messages(&data_url, context),
            prompts::CLASSIFIER_MAX_TOKENS,
        );
        if let Some((false, reason)) = self.classify(&check, &prompts::image_classifier_schema(), "is_math").await {
            return Err(not_math(&reason));
        }

        let concepts = problem.concepts();
        let hints = ProblemHints { domain, difficulty, concepts: &concepts, context };
        let messages = vec![
            ChatMessage::system(prompts::image_system_prompt(domain)),
            ChatMessage::user(prompts::image_user_prompt(&hints)).with_image(data_url),
        ];
        let solution = self.solve_with(&model, messages).await?;
        let user_text = format!("（圖片題目）{}", solution.problem);
        let session_id = self
            .record_solution(problem.session_id, user_text, solution.clone(), &hints, &model)
            .await?;
        Ok(SolvedProblem { session_id, solution })
    }

    /// A classifier verdict. Provider failures and malformed replies count as no verdict.
    async fn classify(
        &self,
        request: &CompletionRequest,
        schema: &crate::llm::OutputSchema,
        field: &str,
    ) -> Option<(bool, String)> {
        match self.backend.complete_json(request, schema).await {
            Ok(value) => prompts::parse_verdict(&value, field),
            Err(e) => {
                warn!("{} classifier failed, continuing without it: {}", schema.name, e);
                None
            }
        }
    }

    async fn solve_with(&self, model: &str, messages: Vec<ChatMessage>) -> Result<MathSolution, TutorError> {
        let request = self.request(model, messages, prompts::SOLVE_MAX_TOKENS);
        let value = self
            .backend
            .complete_json(&request, &prompts::solution_schema())
            .await
            .map_err(|e| {
                metrics::inc_upstream_failures();
                error!("Math solution failed: {}", e);
                TutorError::upstream(e)
            })?;
        match prompts::parse_solution(&value) {
            SolutionReply::Solved(solution) => Ok(solution),
            SolutionReply::NotMath => Err(not_math("")),
            SolutionReply::Unusable(reason) => {
                metrics::inc_upstream_failures();
                Err(TutorError::Upstream(format!("LLM reply was not a usable math solution: {}", reason)))
            }
        }
    }

    async fn generate_title(&self, model: &str, problem: &str) -> String {
        let request = self.request(
            model,
            vec![ChatMessage::system(prompts::TITLE_SYSTEM_PROMPT), ChatMessage::user(problem)],
            prompts::TITLE_MAX_TOKENS,
        );
        match self.backend.complete(&request).await {
            Ok(raw) => prompts::clean_title(&raw),
            Err(e) => {
                warn!("Title generation failed: {}", e);
                prompts::FALLBACK_TITLE.to_string()
            }
        }
    }

    fn fresh_record(&self, title: String, hints: &ProblemHints<'_>, model: &str) -> SessionRecord {
        SessionRecord {
            messages: Vec::new(),
            metadata: SessionMetadata {
                topic: hints.domain.map_or(FEATURE_MATH, |d| d.as_str()).to_string(),
                level: hints.difficulty.map(|d| d.as_str().to_string()).unwrap_or_default(),
                model: model.to_string(),
                title: Some(title),
                created_at: Some(now_timestamp()),
                feature: Some(FEATURE_MATH.to_string()),
                ..Default::default()
            },
            home: Partition::Active,
        }
    }

    /// The math session `sid`, or `None` when it does not exist yet.
    async fn existing(&self, sid: &str) -> Result<Option<SessionRecord>, TutorError> {
        match self.sessions.checkout(sid).await {
            Ok(record) if record.metadata.feature.as_deref() == Some(FEATURE_MATH) => Ok(Some(record)),
            Ok(_) => Err(TutorError::Validation(format!("Session {} is not a math session", sid))),
            Err(TutorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn record_solution(
        &self,
        session_id: Option<String>,
        user_text: String,
        solution: MathSolution,
        hints: &ProblemHints<'_>,
        model: &str,
    ) -> Result<String, TutorError> {
        let existing = match session_id.as_deref() {
            Some(sid) => self.existing(sid).await?,
            None => None,
        };
        let sid = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut record = match existing {
            Some(record) => record,
            None => {
                let title = self.generate_title(model, &solution.problem).await;
                info!("Starting math session {} ({})", sid, title);
                self.fresh_record(title, hints, model)
            }
        };
        record.messages.push(Message::user(user_text));
        record.messages.push(Message::assistant(MessageContent::Solution(Box::new(solution))));
        self.sessions.store(&sid, record).await;
        metrics::inc_turns();
        Ok(sid)
    }

    /// Answer a follow-up question about a stored solution.
    pub async fn question(&self, request: QuestionRequest) -> Result<QuestionAnswer, TutorError> {
        let question = required(&request.question, "Question")?;
        SessionController::validate_sid(&request.session_id)?;
        let sid = request.session_id.as_str();
        let mut record = match self.existing(sid).await? {
            Some(record) if !record.messages.is_empty() => record,
            _ => return Err(TutorError::NotFound(format!("Math session {} has no history", sid))),
        };

        let last_solution = record.messages.iter().rev().find_map(|m| match &m.content {
            MessageContent::Solution(solution) => Some(solution.as_ref()),
            _ => None,
        });
        let asked = prompts::annotate_question(question, request.step_number, last_solution, request.context.as_deref());
        let model = if record.metadata.model.trim().is_empty() { self.model() } else { record.metadata.model.clone() };
        let completion = self.request(
            &model,
            prompts::question_messages(&record.messages, asked),
            prompts::EXPLAIN_MAX_TOKENS,
        );
        let answer = self.backend.complete(&completion).await.map_err(|e| {
            metrics::inc_upstream_failures();
            error!("Follow-up answer failed for session {}: {}", sid, e);
            TutorError::upstream(e)
        })?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            metrics::inc_upstream_failures();
            return Err(TutorError::Upstream("LLM returned an empty answer".to_string()));
        }

        record.messages.push(Message::user(question));
        record.messages.push(Message::assistant(MessageContent::PlainText(answer.clone())));
        self.sessions.store(sid, record).await;
        metrics::inc_turns();
        Ok(QuestionAnswer { answer })
    }

    /// Explain a concept; stored only when a session is named.
    pub async fn concept(&self, request: ConceptRequest) -> Result<ConceptExplanation, TutorError> {
        let name = required(&request.concept_name, "Concept name")?;
        let domain = parse_optional::<MathDomain>(request.domain.as_deref())?;
        if let Some(sid) = request.session_id.as_deref() {
            SessionController::validate_sid(sid)?;
        }
        let model = self.model();

        let context = knowledge::concept_context(name, domain);
        let messages = vec![
            ChatMessage::system(prompts::concept_system_prompt(&context)),
            ChatMessage::user(prompts::concept_user_prompt(name)),
        ];
        let completion = self.request(&model, messages, prompts::EXPLAIN_MAX_TOKENS);
        let value = self
            .backend
            .complete_json(&completion, &prompts::concept_schema())
            .await
            .map_err(|e| {
                metrics::inc_upstream_failures();
                error!("Concept explanation for '{}' failed: {}", name, e);
                TutorError::upstream(e)
            })?;
        let mut explanation: ConceptExplanation = serde_json::from_value(value).map_err(|e| {
            metrics::inc_upstream_failures();
            TutorError::Upstream(format!("LLM reply was not a usable concept explanation: {}", e))
        })?;

        if let Some(sid) = request.session_id {
            let hints = ProblemHints { domain, difficulty: None, concepts: &[], context: None };
            let mut record = match self.existing(&sid).await? {
                Some(record) => record,
                None => self.fresh_record(name.to_string(), &hints, &model),
            };
            record.messages.push(Message::user(prompts::concept_user_prompt(name)));
            record
                .messages
                .push(Message::assistant(MessageContent::PlainText(explanation.explanation.clone())));
            self.sessions.store(&sid, record).await;
            explanation.session_id = Some(sid);
        }
        Ok(explanation)
    }

    /// Math sessions, most recently updated first.
    pub async fn list_conversations(&self) -> Result<Vec<MathConversation>, TutorError> {
        let hits = self
            .sessions
            .search(&SearchQuery::feature(FEATURE_MATH).with_limit(usize::MAX))
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| MathConversation {
                session_id: hit.sid,
                title: hit.title,
                created_at: hit.created_at,
                updated_at: hit.updated_at,
            })
            .collect())
    }

    pub fn search_concepts(&self, keyword: &str) -> Result<ConceptSearch, TutorError> {
        let keyword = required(keyword, "Keyword")?;
        let results = knowledge::matching(keyword, None);
        Ok(ConceptSearch { total: results.len(), results })
    }

    pub async fn status(&self) -> Result<TutorStatus, TutorError> {
        let conversations = self.list_conversations().await?.len();
        Ok(TutorStatus { model: self.model(), conversations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation_db::ConversationDatabase;
    use crate::llm::{RecordedCall, ScriptedBackend, ScriptedReply};
    use crate::memory::SessionMemory;
    use crate::model_registry::ModelDefaults;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        backend: Arc<ScriptedBackend>,
        sessions: SessionController,
        tutor: MathTutor,
    }

    fn harness(replies: Vec<ScriptedReply>) -> Harness {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(ConversationDatabase::open(dir.path()).unwrap());
        let backend = Arc::new(ScriptedBackend::with_replies(replies));
        let registry = Arc::new(ModelRegistry::new(ModelDefaults::default(), None));
        let sessions = SessionController::new(db, SessionMemory::new(), backend.clone(), registry.clone());
        let tutor = MathTutor::new(sessions.clone(), backend.clone(), registry);
        Harness { _dir: dir, backend, sessions, tutor }
    }

    fn is_math() -> ScriptedReply {
        ScriptedReply::Json(json!({"is_reasonable_math_question": true, "reason": "equation"}))
    }

    fn solution_reply() -> Value {
        json!({
            "is_math_question": true,
            "problem": "x^2 - 5x + 6 = 0",
            "domain": "代數與函數",
            "relevant_concepts": ["因式分解"],
            "solution_approach": "因式分解",
            "steps": [
                {"step_number": 1, "description": "分解為 (x-2)(x-3)", "reasoning": "2 x 3 = 6", "calculation": "", "key_insight": ""},
                {"step_number": 2, "description": "令各因式為零", "reasoning": "零積性質", "calculation": "", "key_insight": ""}
            ],
            "final_answer": "x = 2 或 x = 3",
            "verification": "代回成立",
            "alternative_methods": ["公式解"]
        })
    }

    fn problem(text: &str) -> MathProblem {
        MathProblem { problem: text.into(), domain: Some("代數與函數".into()), difficulty: Some("基礎".into()), ..Default::default() }
    }

    #[tokio::test]
    async fn test_solve_stores_a_math_session() {
        let h = harness(vec![
            is_math(),
            ScriptedReply::Json(solution_reply()),
            ScriptedReply::Text("\"二次方程式求解\"".into()),
        ]);
        let solved = h.tutor.solve(problem("x^2 - 5x + 6 = 0")).await.unwrap();
        assert_eq!(solved.solution.final_answer, "x = 2 或 x = 3");
        assert_eq!(solved.solution.steps.len(), 2);

        let record = h.sessions.memory().get(&solved.session_id).unwrap();
        assert_eq!(record.metadata.feature.as_deref(), Some(FEATURE_MATH));
        assert_eq!(record.metadata.topic, "代數與函數");
        assert_eq!(record.metadata.level, "基礎");
        assert_eq!(record.metadata.title.as_deref(), Some("二次方程式求解"));
        assert_eq!(record.messages.len(), 2);
        assert!(matches!(record.messages[1].content, MessageContent::Solution(_)));

        let listed = h.tutor.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, solved.session_id);
        assert_eq!(listed[0].title, "二次方程式求解");

        // The stored solution reads back from disk as structured content.
        let (messages, _) = h.sessions.database().load(&solved.session_id, Partition::Active);
        assert!(matches!(&messages[1].content, MessageContent::Solution(s) if s.steps.len() == 2));
    }

    #[tokio::test]
    async fn test_solve_continues_given_session_without_new_title() {
        let h = harness(vec![
            is_math(),
            ScriptedReply::Json(solution_reply()),
            ScriptedReply::Text("二次方程".into()),
            is_math(),
            ScriptedReply::Json(solution_reply()),
        ]);
        let first = h.tutor.solve(problem("x^2 - 5x + 6 = 0")).await.unwrap();
        let again = MathProblem { session_id: Some(first.session_id.clone()), ..problem("再解一次") };
        let second = h.tutor.solve(again).await.unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(h.sessions.memory().get(&first.session_id).unwrap().messages.len(), 4);
        assert_eq!(h.backend.remaining(), 0);
    }

    #[tokio::test]
    async fn test_non_math_input_is_rejected_before_solving() {
        let h = harness(vec![ScriptedReply::Json(
            json!({"is_reasonable_math_question": false, "reason": "a recipe"}),
        )]);
        let err = h.tutor.solve(problem("How do I bake bread?")).await.unwrap_err();
        assert!(matches!(&err, TutorError::Validation(m) if m.starts_with("[NOT_MATH]") && m.contains("a recipe")));
        assert_eq!(h.backend.calls().len(), 1);
        assert!(h.tutor.list_conversations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_does_not_block_solving() {
        let h = harness(vec![
            ScriptedReply::Fail("classifier down".into()),
            ScriptedReply::Json(json!({"is_math_question": false})),
        ]);
        let err = h.tutor.solve(problem("hello")).await.unwrap_err();
        assert!(matches!(&err, TutorError::Validation(m) if m.starts_with("[NOT_MATH]")));
    }

    #[tokio::test]
    async fn test_bad_inputs_are_validation_errors() {
        let h = harness(vec![]);
        let blank = h.tutor.solve(problem("  ")).await.unwrap_err();
        assert!(matches!(blank, TutorError::Validation(_)));
        let bad_domain = MathProblem { domain: Some("algebra".into()), ..problem("1+1") };
        assert!(matches!(h.tutor.solve(bad_domain).await, Err(TutorError::Validation(_))));
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_question_references_the_asked_step() {
        let h = harness(vec![
            is_math(),
            ScriptedReply::Json(solution_reply()),
            ScriptedReply::Text("二次方程".into()),
            ScriptedReply::Text("因為乘積為零時至少一個因式為零。".into()),
        ]);
        let solved = h.tutor.solve(problem("x^2 - 5x + 6 = 0")).await.unwrap();
        let answer = h
            .tutor
            .question(QuestionRequest {
                session_id: solved.session_id.clone(),
                question: "為什麼可以這樣做？".into(),
                step_number: Some(2),
                context: None,
            })
            .await
            .unwrap();
        assert_eq!(answer.answer, "因為乘積為零時至少一個因式為零。");

        let Some(RecordedCall::Complete(request)) = h.backend.calls().pop() else {
            panic!("expected a completion call");
        };
        let asked = request.messages.last().unwrap();
        assert!(asked.content.contains("針對步驟 2") && asked.content.contains("令各因式為零"));
        assert_eq!(h.sessions.memory().get(&solved.session_id).unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_question_on_unknown_session_is_not_found() {
        let h = harness(vec![]);
        let request = QuestionRequest {
            session_id: "missing-session".into(),
            question: "why?".into(),
            ..Default::default()
        };
        assert!(matches!(h.tutor.question(request).await, Err(TutorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concept_failure_is_upstream_and_unstored() {
        let h = harness(vec![ScriptedReply::Fail("provider down".into())]);
        let request = ConceptRequest {
            concept_name: "判別式".into(),
            domain: None,
            session_id: Some("concept-session".into()),
        };
        assert!(matches!(h.tutor.concept(request).await, Err(TutorError::Upstream(_))));
        assert!(h.sessions.memory().get("concept-session").is_none());
    }

    #[tokio::test]
    async fn test_concept_with_session_is_stored() {
        let h = harness(vec![ScriptedReply::Json(json!({
            "concept_name": "判別式",
            "domain": "代數與函數",
            "explanation": "b^2 - 4ac 決定根的性質",
            "key_points": ["大於零有兩相異實根"],
            "examples": ["x^2 + 1 = 0 無實根"],
            "additional_context": ""
        }))]);
        let request = ConceptRequest {
            concept_name: "判別式".into(),
            domain: Some("代數與函數".into()),
            session_id: Some("concept-session".into()),
        };
        let explanation = h.tutor.concept(request).await.unwrap();
        assert_eq!(explanation.session_id.as_deref(), Some("concept-session"));

        let Some(RecordedCall::CompleteJson(sent, schema)) = h.backend.calls().pop() else {
            panic!("expected a JSON completion");
        };
        assert_eq!(schema, "explain_math_concept");
        assert!(sent.messages[0].content.contains("代數與函數 - 方程式: 判別式"));

        let record = h.sessions.memory().get("concept-session").unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.metadata.feature.as_deref(), Some(FEATURE_MATH));
    }

    #[tokio::test]
    async fn test_image_needs_image_content_type() {
        let h = harness(vec![]);
        let err = h.tutor.solve_image(b"%PDF-1.4", "application/pdf", ImageProblem::default()).await.unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
        let err = h.tutor.solve_image(b"", "image/png", ImageProblem::default()).await.unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_image_travels_as_data_url() {
        let h = harness(vec![
            ScriptedReply::Json(json!({"is_math": true, "reason": "equation"})),
            ScriptedReply::Json(solution_reply()),
            ScriptedReply::Text("圖片題目".into()),
        ]);
        let solved = h.tutor.solve_image(b"\x89PNG", "image/png", ImageProblem::default()).await.unwrap();

        let calls = h.backend.calls();
        let RecordedCall::CompleteJson(request, schema) = &calls[1] else {
            panic!("expected the solution call");
        };
        assert_eq!(schema, "math_solution");
        let user = request.messages.last().unwrap();
        assert_eq!(user.images, vec![format!("data:image/png;base64,{}", STANDARD.encode(b"\x89PNG"))]);

        let record = h.sessions.memory().get(&solved.session_id).unwrap();
        assert!(record.messages[0].content.text().contains("x^2 - 5x + 6 = 0"));
    }

    #[tokio::test]
    async fn test_image_classified_as_not_math_is_rejected() {
        let h = harness(vec![ScriptedReply::Json(json!({"is_math": false, "reason": "a cat"}))]);
        let err = h.tutor.solve_image(b"jpeg", "image/jpeg", ImageProblem::default()).await.unwrap_err();
        assert!(matches!(&err, TutorError::Validation(m) if m.starts_with("[NOT_MATH]")));
    }

    #[tokio::test]
    async fn test_language_sessions_are_not_math_sessions() {
        let h = harness(vec![ScriptedReply::Text("Hello!".into())]);
        let created = h
            .sessions
            .create(crate::session_engine::CreateSession { topic: "food".into(), level: "A1".into(), ..Default::default() })
            .await
            .unwrap();
        let request = QuestionRequest { session_id: created.sid, question: "why?".into(), ..Default::default() };
        assert!(matches!(h.tutor.question(request).await, Err(TutorError::Validation(_))));
        assert!(h.tutor.list_conversations().await.unwrap().is_empty());
    }

    #[test]
    fn test_concept_search_requires_keyword() {
        let h = harness(vec![]);
        assert!(matches!(h.tutor.search_concepts(" "), Err(TutorError::Validation(_))));
        let found = h.tutor.search_concepts("定理").unwrap();
        assert_eq!(found.total, found.results.len());
        assert!(found.results.iter().any(|m| m.concept == "餘弦定理"));
    }
}
