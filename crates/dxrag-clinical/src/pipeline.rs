//! Clinical reasoning strategies over a [`ChatModel`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use dxrag_core::error::{Error, Result};
use dxrag_core::traits::ChatModel;

use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Triage+differential, then workup+treatment, then assembly.
    #[default]
    MultiStage,
    SingleShot,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultiStage => "multi-stage",
            Self::SingleShot => "single-shot",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PipelineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "multi-stage" | "multistage" => Ok(Self::MultiStage),
            "single-shot" | "singleshot" => Ok(Self::SingleShot),
            other => Err(Error::Configuration(format!(
                "unknown pipeline '{other}' (expected multi-stage or single-shot)"
            ))),
        }
    }
}

/// Everything a strategy reasons over.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    pub symptoms: &'a str,
    pub patient: &'a str,
    pub doc_context: &'a str,
    pub web_context: &'a str,
}

pub struct ClinicalPipeline {
    chat: Arc<dyn ChatModel>,
}

impl ClinicalPipeline {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub fn chat(&self) -> &Arc<dyn ChatModel> {
        &self.chat
    }

    pub async fn run(&self, mode: PipelineMode, input: &PipelineInput<'_>) -> Result<String> {
        match mode {
            PipelineMode::MultiStage => self.multi_stage(input).await,
            PipelineMode::SingleShot => self.single_shot(input).await,
        }
    }

    /// Three strictly sequential calls; stage 2 receives stage 1's output in
    /// place of the reference material.
    pub async fn multi_stage(&self, input: &PipelineInput<'_>) -> Result<String> {
        let prompt = prompts::triage_differential(input.patient, input.symptoms, input.doc_context, input.web_context);
        let differential = self.stage("triage-differential", &prompt).await?;

        let prompt = prompts::workup_treatment(input.patient, &differential);
        let plan = self.stage("workup-treatment", &prompt).await?;

        let prompt = prompts::assembly(input.patient, &differential, &plan);
        self.stage("assembly", &prompt).await
    }

    pub async fn single_shot(&self, input: &PipelineInput<'_>) -> Result<String> {
        let prompt = prompts::single_shot(input.patient, input.symptoms, input.doc_context, input.web_context);
        self.stage("single-shot", &prompt).await
    }

    async fn stage(&self, name: &str, prompt: &str) -> Result<String> {
        debug!(stage = name, prompt_chars = prompt.len(), "Stage started");
        let output = self.chat.invoke(prompt).await.map_err(|e| match e {
            Error::Generation(msg) => Error::Generation(format!("{name}: {msg}")),
            other => other,
        })?;
        info!(stage = name, provider = self.chat.provider(), response_chars = output.len(), "Stage finished");
        Ok(output)
    }
}
