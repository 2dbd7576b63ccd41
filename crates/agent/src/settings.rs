//! Runtime knobs for the orchestrator, derived from [`AppConfig`].

use chatweave_assembler::{TagFamily, TagScanner};
use chatweave_config::AppConfig;

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub reasoning_tags: Vec<String>,
    pub code_interpreter_tags: Vec<String>,
    pub detect_reasoning: bool,
    pub realtime_save: bool,
    pub max_tool_call_retries: u32,
    pub max_code_retries: u32,
    pub sandbox_timeout_secs: u64,
    pub max_file_bytes: usize,

    /// Model for code follow-up turns; the request model when unset.
    pub code_model: Option<String>,
    pub summary_prompt: String,
    pub fail_prompt: String,
}

impl From<&AppConfig> for CompletionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            reasoning_tags: config.completion.reasoning_tags.clone(),
            code_interpreter_tags: config.completion.code_interpreter_tags.clone(),
            detect_reasoning: config.completion.detect_reasoning,
            realtime_save: config.completion.realtime_save,
            max_tool_call_retries: config.completion.max_tool_call_retries,
            max_code_retries: config.code_interpreter.max_retries,
            sandbox_timeout_secs: config.code_interpreter.sandbox_timeout_secs,
            max_file_bytes: config.code_interpreter.max_file_bytes,
            code_model: config.code_interpreter.model.clone(),
            summary_prompt: config.code_interpreter.summary_prompt.clone(),
            fail_prompt: config.code_interpreter.fail_prompt.clone(),
        }
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl CompletionSettings {
    /// Scanner for one request. Reasoning is recognized before code.
    pub fn scanner(&self, code_interpreter: bool) -> TagScanner {
        let mut families = Vec::new();
        if self.detect_reasoning {
            families.push(TagFamily::reasoning(self.reasoning_tags.iter().cloned()));
        }
        if code_interpreter {
            families.push(TagFamily::code_interpreter(self.code_interpreter_tags.iter().cloned()));
        }
        TagScanner::new(families)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatweave_assembler::BlockKind;

    #[test]
    fn defaults_follow_config() {
        let settings = CompletionSettings::default();
        assert_eq!(settings.max_tool_call_retries, 5);
        assert_eq!(settings.max_code_retries, 3);
        assert!(settings.code_model.is_none());
    }

    #[test]
    fn scanner_families_follow_features() {
        let settings = CompletionSettings::default();
        let scanner = settings.scanner(false);
        assert_eq!(scanner.kind_of("think"), Some(BlockKind::Reasoning));
        assert_eq!(scanner.kind_of("code_interpreter"), None);

        let scanner = settings.scanner(true);
        assert_eq!(scanner.kind_of("code_interpreter"), Some(BlockKind::CodeInterpreter));

        let settings = CompletionSettings {
            detect_reasoning: false,
            ..CompletionSettings::default()
        };
        assert_eq!(settings.scanner(true).families().len(), 1);
    }
}
