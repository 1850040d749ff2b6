//! Diagnosis orchestration: session profile, retrieval, optional web lookup,
//! then the configured reasoning pipeline.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use dxrag_core::config::{EngineSettings, Settings};
use dxrag_core::error::{Error, Result};
use dxrag_core::traits::{ChatModel, SemanticSearch, WebSearch};
use dxrag_embed::{get_cross_encoder, ModelCache};
use dxrag_hybrid::{HybridRetriever, Reranker, NO_DOCUMENTS_SENTINEL};
use dxrag_vector::IndexManager;

use crate::llm::{HttpChatModel, LlmConfig};
use crate::patient::{PatientProfile, PatientUpdate};
use crate::pipeline::{ClinicalPipeline, PipelineInput, PipelineMode};
use crate::session::{SessionStore, DEFAULT_SESSION};
use crate::web_search::{DuckDuckGo, WebSearcher};

/// Context shorter than this is not counted as substantive.
const SUBSTANTIVE_CONTEXT_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct DiagnoseRequest {
    pub symptoms: String,
    pub session_id: String,
    /// Raw `field = value` profile overrides, validated before use.
    pub patient_overrides: Vec<(String, String)>,
    /// Overrides the engine's web search default for this call.
    pub web_search: Option<bool>,
}

impl DiagnoseRequest {
    pub fn new(symptoms: impl Into<String>) -> Self {
        Self {
            symptoms: symptoms.into(),
            session_id: DEFAULT_SESSION.to_string(),
            patient_overrides: Vec::new(),
            web_search: None,
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.patient_overrides.push((field.into(), value.into()));
        self
    }

    pub fn web_search(mut self, enabled: bool) -> Self {
        self.web_search = Some(enabled);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    pub report: String,
    pub symptoms: String,
    pub patient_info: String,
    pub document_context_used: bool,
    pub web_search_used: bool,
    pub pipeline: String,
    pub retrieval: String,
    pub provider: String,
    pub model: String,
}

pub struct Engine {
    retriever: Arc<HybridRetriever>,
    web: WebSearcher,
    pipeline: ClinicalPipeline,
    mode: PipelineMode,
    sessions: SessionStore,
    web_enabled: bool,
    thin_context_chars: usize,
}

impl Engine {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        chat: Arc<dyn ChatModel>,
        web: Arc<dyn WebSearch>,
        settings: &EngineSettings,
    ) -> Result<Self> {
        Ok(Self {
            retriever,
            web: WebSearcher::new(web, settings.web_results),
            pipeline: ClinicalPipeline::new(chat),
            mode: settings.pipeline.parse()?,
            sessions: SessionStore::new(),
            web_enabled: settings.web_search,
            thin_context_chars: settings.thin_context_chars,
        })
    }

    /// Production wiring: HTTP chat model, fingerprinted index, cross-encoder
    /// when available, DuckDuckGo. The credential is checked before any
    /// index work starts.
    pub async fn from_settings(settings: &Settings, api_key: Option<String>) -> Result<Self> {
        let llm = LlmConfig::from_settings(&settings.llm, api_key)?;
        let timeout = llm.timeout_secs;
        let chat: Arc<dyn ChatModel> = Arc::new(HttpChatModel::new(llm)?);

        let retriever = Arc::new(build_retriever(settings).await?);
        let web: Arc<dyn WebSearch> = Arc::new(DuckDuckGo::new(timeout)?);
        let engine = Self::new(retriever, chat, web, &settings.engine)?;
        info!(
            provider = engine.provider(),
            model = engine.model(),
            retrieval = %engine.retriever.description(),
            pipeline = %engine.mode,
            "Engine initialised"
        );
        Ok(engine)
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn provider(&self) -> &str {
        self.pipeline.chat().provider()
    }

    pub fn model(&self) -> &str {
        self.pipeline.chat().model()
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn get_patient(&self, session_id: &str) -> PatientProfile {
        self.sessions.get_or_create(session_id)
    }

    pub fn set_patient(&self, session_id: &str, profile: PatientProfile) {
        self.sessions.set(session_id, profile);
    }

    pub async fn retrieve_context(&self, query: &str) -> Result<String> {
        self.retriever.retrieve_context(query).await
    }

    pub async fn diagnose(&self, request: DiagnoseRequest) -> Result<DiagnosisReport> {
        if request.symptoms.trim().is_empty() {
            return Err(Error::Validation("symptoms must not be empty".into()));
        }
        let symptoms = request.symptoms.as_str();
        let update = PatientUpdate::parse(request.patient_overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        let session_id = if request.session_id.trim().is_empty() { DEFAULT_SESSION } else { request.session_id.as_str() };

        let patient = if update.is_empty() {
            self.sessions.get_or_create(session_id)
        } else {
            self.sessions.apply_update(session_id, update)
        };
        let patient_info = patient.render();

        let doc_context = self.retriever.retrieve_context(symptoms).await?;

        let web_enabled = request.web_search.unwrap_or(self.web_enabled);
        let thin = doc_context.chars().count() < self.thin_context_chars || doc_context == NO_DOCUMENTS_SENTINEL;
        debug!(web_enabled, thin, context_chars = doc_context.len(), "Web search gate");
        let web_context = if web_enabled && thin { self.web.context(symptoms).await } else { String::new() };

        let input = PipelineInput { symptoms, patient: &patient_info, doc_context: &doc_context, web_context: &web_context };
        let report = self.pipeline.run(self.mode, &input).await?;

        Ok(DiagnosisReport {
            report,
            symptoms: symptoms.to_string(),
            patient_info,
            document_context_used: is_substantive(&doc_context),
            web_search_used: !web_context.is_empty(),
            pipeline: self.mode.to_string(),
            retrieval: self.retriever.description(),
            provider: self.provider().to_string(),
            model: self.model().to_string(),
        })
    }

    /// Single-shot diagnosis for an explicit profile; touches no session.
    /// Web search runs whenever enabled, regardless of context size.
    pub async fn quick_diagnose(&self, symptoms: &str, profile: &PatientProfile) -> Result<String> {
        if symptoms.trim().is_empty() {
            return Err(Error::Validation("symptoms must not be empty".into()));
        }
        let patient_info = profile.render();
        let doc_context = self.retriever.retrieve_context(symptoms).await?;
        let web_context = if self.web_enabled { self.web.context(symptoms).await } else { String::new() };
        let input = PipelineInput { symptoms, patient: &patient_info, doc_context: &doc_context, web_context: &web_context };
        self.pipeline.single_shot(&input).await
    }
}

/// Load (or rebuild) the corpus index and wrap it with BM25 and the best
/// available reranker.
pub async fn build_retriever(settings: &Settings) -> Result<HybridRetriever> {
    let loaded = IndexManager::new(settings).load_or_build(&settings.data.docs_dir, &settings.data.index_dir).await?;
    info!(origin = ?loaded.origin, chunks = loaded.index.len(), "Semantic index ready");
    let semantic: Arc<dyn SemanticSearch> = loaded.index;

    let scorer = get_cross_encoder(&settings.models, ModelCache::global());
    let reranker = Reranker::new(scorer, settings.retrieval.passage_chars);
    Ok(HybridRetriever::from_semantic(semantic, &settings.retrieval, reranker))
}

fn is_substantive(doc_context: &str) -> bool {
    doc_context.chars().count() > SUBSTANTIVE_CONTEXT_CHARS && doc_context != NO_DOCUMENTS_SENTINEL
}
