use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INSTRUCTION, DEFAULT_PERSONA_ID};
use crate::utils::ValidationError;

/// A named system instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub label: String,
    pub instruction: String,
}

impl Persona {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            instruction: instruction.into(),
        }
    }
}

/// Ordered, read-only table of personas
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

fn tutor_instruction(language: &str, guidance: &str) -> String {
    format!(
        "You are a friendly {language} language tutor. \
         Respond primarily in {language}, with brief English explanations if needed. \
         Correct mistakes gently, provide 2-3 alternative phrases, and include pronunciation \
         in Latin script when useful. {guidance}"
    )
}

impl PersonaCatalog {
    /// The presets shipped with the application
    pub fn builtin() -> Self {
        let personas = vec![
            Persona::new(
                DEFAULT_PERSONA_ID,
                "Default (Helpful Assistant)",
                DEFAULT_INSTRUCTION,
            ),
            Persona::new(
                "tamil-tutor",
                "Tamil Tutor (தமிழ்)",
                "You are a friendly Tamil language tutor. \
                 Respond primarily in Tamil, but you may include short English explanations when helpful. \
                 Correct mistakes gently, provide 2-3 alternatives, and include pronunciation in Latin script when useful. \
                 Keep responses concise and practical for daily conversation.",
            ),
            Persona::new(
                "marathi-tutor",
                "Marathi Tutor (मराठी)",
                tutor_instruction(
                    "Marathi",
                    "Focus on everyday conversation and polite forms.",
                ),
            ),
            Persona::new(
                "telugu-tutor",
                "Telugu Tutor (తెలుగు)",
                tutor_instruction(
                    "Telugu",
                    "Prefer short, everyday-life sentences and include both questions and answers when relevant.",
                ),
            ),
            Persona::new(
                "hindi-tutor",
                "Hindi Tutor (हिंदी)",
                tutor_instruction("Hindi", "Focus on polite, everyday conversation."),
            ),
        ];

        Self { personas }
    }

    /// Add operator-defined personas. An entry with an existing id replaces
    /// the original in place; new ids are appended in the given order.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = Persona>) -> Self {
        for persona in extra {
            match self.personas.iter_mut().find(|p| p.id == persona.id) {
                Some(existing) => *existing = persona,
                None => self.personas.push(persona),
            }
        }
        self
    }

    pub fn lookup(&self, id: &str) -> Result<&Persona, ValidationError> {
        self.personas
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ValidationError::UnknownPersona(id.to_string()))
    }

    /// `(id, label)` pairs in catalog order
    pub fn list(&self) -> impl Iterator<Item = (&str, &str)> {
        self.personas
            .iter()
            .map(|p| (p.id.as_str(), p.label.as_str()))
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn find_by_instruction(&self, instruction: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.instruction == instruction)
    }

    /// Position of `id` in the catalog, used for cycling in the UI
    pub fn position(&self, id: &str) -> Option<usize> {
        self.personas.iter().position(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
