//! dxrag-clinical
//!
//! Patient sessions, the clinical reasoning pipeline and the engine that ties
//! retrieval, web lookup and generation together.

pub mod engine;
pub mod llm;
pub mod patient;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod web_search;

pub use engine::{build_retriever, DiagnoseRequest, DiagnosisReport, Engine};
pub use llm::{HttpChatModel, LlmConfig, LlmProvider, RECOMMENDATIONS};
pub use patient::{PatientField, PatientProfile, PatientUpdate, NO_PATIENT_HISTORY};
pub use pipeline::{ClinicalPipeline, PipelineInput, PipelineMode};
pub use session::{SessionStore, DEFAULT_SESSION};
pub use web_search::{format_results, DuckDuckGo, WebLookup, WebSearcher};
