use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dxrag_clinical::{DiagnoseRequest, Engine, PatientProfile, PipelineMode, NO_PATIENT_HISTORY};
use dxrag_core::config::EngineSettings;
use dxrag_core::error::{Error, Result};
use dxrag_core::traits::{ChatModel, SemanticSearch, WebSearch};
use dxrag_core::types::{ChunkMeta, DocumentChunk, SearchHit, SourceKind, WebResult};
use dxrag_hybrid::{HybridRetriever, Reranker, RetrievalParams, NO_DOCUMENTS_SENTINEL};

struct StubSemantic {
    chunks: Vec<DocumentChunk>,
}

#[async_trait]
impl SemanticSearch for StubSemantic {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<SearchHit>> {
        Ok(self
            .chunks
            .iter()
            .take(k)
            .map(|c| SearchHit { chunk: c.clone(), score: 0.8, source: SourceKind::Vector })
            .collect())
    }

    fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }
}

/// Records every prompt and answers `STAGE-<n> OUTPUT`.
#[derive(Default)]
struct RecordingChat {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingChat {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    fn provider(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-1"
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(Error::Generation("quota exceeded".into()));
        }
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(format!("STAGE-{} OUTPUT", prompts.len()))
    }
}

#[derive(Default)]
struct StubWeb {
    results: Vec<WebResult>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl WebSearch for StubWeb {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<WebResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(Error::WebSearch("timeout".into()));
        }
        Ok(self.results.clone())
    }
}

fn long_chunk() -> DocumentChunk {
    let text = "Community-acquired pneumonia presents with fever, cough and pleuritic chest pain. \
                Obtain a chest radiograph, CBC and blood cultures before starting empiric antibiotics. "
        .repeat(3);
    DocumentChunk::new(text, ChunkMeta { source_name: "pneumonia.pdf".into(), page_number: 4 }, 0)
}

fn engine(chunks: Vec<DocumentChunk>, chat: Arc<RecordingChat>, web: Arc<StubWeb>) -> Engine {
    let semantic: Arc<dyn SemanticSearch> = Arc::new(StubSemantic { chunks });
    let retriever = Arc::new(HybridRetriever::new(semantic, None, Reranker::keyword(), RetrievalParams::default()));
    Engine::new(retriever, chat, web, &EngineSettings::default()).unwrap()
}

fn web_hits() -> Vec<WebResult> {
    vec![WebResult { title: "Fever workup".into(), snippet: "Check for sepsis criteria".into() }]
}

#[tokio::test]
async fn sentinel_context_triggers_web_search() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { results: web_hits(), ..StubWeb::default() });
    let engine = engine(Vec::new(), chat.clone(), web.clone());

    let report = engine.diagnose(DiagnoseRequest::new("fever, cough")).await.unwrap();

    assert!(!report.document_context_used);
    assert!(report.web_search_used);
    assert_eq!(web.queries.lock().unwrap().len(), 1, "targeted query succeeded, no fallback");
    let first = &chat.prompts()[0];
    assert!(first.contains(NO_DOCUMENTS_SENTINEL));
    assert!(first.contains("• **Fever workup**: Check for sepsis criteria"));
}

#[tokio::test]
async fn empty_targeted_search_falls_back_once() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb::default());
    let engine = engine(Vec::new(), chat.clone(), web.clone());

    let report = engine.diagnose(DiagnoseRequest::new("rash")).await.unwrap();

    assert!(!report.web_search_used);
    let queries = web.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("site:ncbi.nlm.nih.gov"));
    assert_eq!(queries[1], "rash diagnosis treatment clinical guidelines");
    assert!(chat.prompts()[0].contains("## ADDITIONAL RESEARCH\nNone\n"));
}

#[tokio::test]
async fn web_failure_degrades_to_no_context() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { fail: true, ..StubWeb::default() });
    let engine = engine(Vec::new(), chat.clone(), web);

    let report = engine.diagnose(DiagnoseRequest::new("headache")).await.unwrap();
    assert!(!report.web_search_used);
    assert_eq!(report.report, "STAGE-3 OUTPUT");
}

#[tokio::test]
async fn substantive_context_skips_web_search() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { results: web_hits(), ..StubWeb::default() });
    let engine = engine(vec![long_chunk()], chat, web.clone());

    let report = engine.diagnose(DiagnoseRequest::new("fever and cough")).await.unwrap();
    assert!(report.document_context_used);
    assert!(!report.web_search_used);
    assert!(web.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reference_text_mentioning_no_relevant_is_still_substantive() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { results: web_hits(), ..StubWeb::default() });
    let text = "Chest radiograph: No relevant abnormality detected in the lower lobes. ".repeat(20);
    let chunk = DocumentChunk::new(text, ChunkMeta { source_name: "imaging.pdf".into(), page_number: 2 }, 0);
    let engine = engine(vec![chunk], chat.clone(), web.clone());

    let report = engine.diagnose(DiagnoseRequest::new("chest pain")).await.unwrap();

    assert!(report.document_context_used);
    assert!(!report.web_search_used);
    assert!(web.queries.lock().unwrap().is_empty());
    assert!(!chat.prompts()[0].contains(NO_DOCUMENTS_SENTINEL));
}

#[tokio::test]
async fn symptoms_pass_through_verbatim() {
    let chat = Arc::new(RecordingChat::default());
    let engine = engine(vec![long_chunk()], chat.clone(), Arc::new(StubWeb::default()));

    let report = engine.diagnose(DiagnoseRequest::new("  fever, cough ")).await.unwrap();

    assert_eq!(report.symptoms, "  fever, cough ");
    assert!(chat.prompts()[0].contains("## CURRENT SYMPTOMS\n  fever, cough \n"));
}

#[tokio::test]
async fn web_override_disables_lookup() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { results: web_hits(), ..StubWeb::default() });
    let engine = engine(Vec::new(), chat, web.clone());

    let report = engine.diagnose(DiagnoseRequest::new("fever").web_search(false)).await.unwrap();
    assert!(!report.web_search_used);
    assert!(web.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn multi_stage_runs_three_sequential_calls() {
    let chat = Arc::new(RecordingChat::default());
    let engine = engine(vec![long_chunk()], chat.clone(), Arc::new(StubWeb::default()));
    let doc_text = long_chunk().content;

    let report = engine.diagnose(DiagnoseRequest::new("fever, cough").set("age", "45")).await.unwrap();

    let prompts = chat.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("**Age:** 45"));
    assert!(prompts[0].contains("[Source: pneumonia.pdf, Page 4]"));
    assert!(prompts[1].contains("STAGE-1 OUTPUT"));
    assert!(!prompts[1].contains(&doc_text[..200]));
    assert!(!prompts[1].contains("[Source:"));
    assert!(prompts[2].contains("STAGE-1 OUTPUT") && prompts[2].contains("STAGE-2 OUTPUT"));
    assert_eq!(report.report, "STAGE-3 OUTPUT");
    assert_eq!(report.pipeline, "multi-stage");
    assert_eq!(report.retrieval, "Vector+KeywordRerank");
    assert_eq!((report.provider.as_str(), report.model.as_str()), ("stub", "stub-1"));
}

#[tokio::test]
async fn empty_profile_marker_reaches_every_prompt() {
    let chat = Arc::new(RecordingChat::default());
    let engine = engine(vec![long_chunk()], chat.clone(), Arc::new(StubWeb::default()));

    let report = engine.diagnose(DiagnoseRequest::new("fatigue").session("fresh")).await.unwrap();

    assert_eq!(report.patient_info, NO_PATIENT_HISTORY);
    let prompts = chat.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts.iter().all(|p| p.contains(NO_PATIENT_HISTORY)));
}

#[tokio::test]
async fn single_shot_makes_one_call() {
    let chat = Arc::new(RecordingChat::default());
    let engine = engine(vec![long_chunk()], chat.clone(), Arc::new(StubWeb::default())).with_mode(PipelineMode::SingleShot);

    let report = engine.diagnose(DiagnoseRequest::new("fever")).await.unwrap();
    assert_eq!(chat.prompts().len(), 1);
    assert_eq!(report.pipeline, "single-shot");
}

#[tokio::test]
async fn invalid_input_is_rejected_before_generation() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { results: web_hits(), ..StubWeb::default() });
    let engine = engine(Vec::new(), chat.clone(), web.clone());

    let err = engine.diagnose(DiagnoseRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = engine.diagnose(DiagnoseRequest::new("fever").set("blood_type", "A")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert!(chat.prompts().is_empty());
    assert!(web.queries.lock().unwrap().is_empty());
    assert_eq!(engine.get_patient("default"), PatientProfile::default());
}

#[tokio::test]
async fn generation_failure_is_fatal() {
    let chat = Arc::new(RecordingChat { fail: true, ..RecordingChat::default() });
    let engine = engine(vec![long_chunk()], chat, Arc::new(StubWeb::default()));

    let err = engine.diagnose(DiagnoseRequest::new("fever")).await.unwrap_err();
    assert!(matches!(err, Error::Generation(ref m) if m.contains("triage-differential")));
}

#[tokio::test]
async fn sessions_persist_between_calls() {
    let chat = Arc::new(RecordingChat::default());
    let engine = engine(vec![long_chunk()], chat.clone(), Arc::new(StubWeb::default()));

    engine
        .diagnose(DiagnoseRequest::new("fever").session("p1").set("allergies", "penicillin, sulfa"))
        .await
        .unwrap();
    let report = engine.diagnose(DiagnoseRequest::new("cough").session("p1")).await.unwrap();

    assert!(report.patient_info.contains("**⚠️ ALLERGIES:** penicillin, sulfa"));
    assert_eq!(engine.get_patient("p2"), PatientProfile::default());

    let profile = PatientProfile { age: Some(70), ..PatientProfile::default() };
    engine.set_patient("p2", profile.clone());
    assert_eq!(engine.get_patient("p2"), profile);
}

#[tokio::test]
async fn quick_diagnose_is_single_shot_and_sessionless() {
    let chat = Arc::new(RecordingChat::default());
    let web = Arc::new(StubWeb { results: web_hits(), ..StubWeb::default() });
    let engine = engine(vec![long_chunk()], chat.clone(), web.clone());
    let profile = PatientProfile { age: Some(30), medications: vec!["warfarin".into()], ..PatientProfile::default() };

    let out = engine.quick_diagnose("fever and cough", &profile).await.unwrap();

    assert_eq!(out, "STAGE-1 OUTPUT");
    let prompts = chat.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("**Current Medications:** warfarin"));
    assert!(prompts[0].contains("• **Fever workup**"), "web lookup is not gated by context size");
    assert_eq!(web.queries.lock().unwrap().len(), 1);
    assert_eq!(engine.get_patient("default"), PatientProfile::default());
}

#[tokio::test]
async fn concurrent_sessions_do_not_interfere() {
    let chat = Arc::new(RecordingChat::default());
    let engine = Arc::new(engine(vec![long_chunk()], chat, Arc::new(StubWeb::default())));
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                let req = DiagnoseRequest::new("fever").session(format!("s{i}")).set("age", (20 + i).to_string());
                let report = engine.diagnose(req).await.unwrap();
                calls.fetch_add(1, Ordering::SeqCst);
                report.patient_info
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("**Age:** {}", 20 + i));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn provider_is_resolved_before_index_work() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut settings = dxrag_core::config::Settings::default();
    settings.data.docs_dir = tmp.path().join("docs");
    settings.data.index_dir = tmp.path().join("index");
    settings.llm.provider = "mistral".into();

    let err = Engine::from_settings(&settings, Some("key".into())).await.err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(!settings.data.docs_dir.exists(), "corpus directory untouched");
}
