//! Prompt templates for the six advisory calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing how one advisory is requested
//!    requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect the rendered prompts directly
//!    without a remote service, so a field that silently stops being
//!    embedded is caught immediately.
//!
//! Every prompt ends with [`ANSWER_CONSTRAINT`] so the model returns only the
//! requested content and nothing else.

use crate::pipeline::parse::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Appended to every prompt.
pub const ANSWER_CONSTRAINT: &str = "JUST WRITE WHATEVER I ASKED NOT MORE THAN THAT";

/// Substituted into a prompt when the analyzer did not report a field.
pub const UNKNOWN_FIELD: &str = "unknown";

/// One advisory category. The bundle holds exactly one text per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryKind {
    Hairstyle,
    Beard,
    Spectacles,
    Acne,
    Skin,
    Wrinkles,
}

impl AdvisoryKind {
    /// All kinds, in the order the calls are issued.
    pub const ALL: [AdvisoryKind; 6] = [
        AdvisoryKind::Hairstyle,
        AdvisoryKind::Beard,
        AdvisoryKind::Spectacles,
        AdvisoryKind::Acne,
        AdvisoryKind::Skin,
        AdvisoryKind::Wrinkles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hairstyle => "hairstyle",
            Self::Beard => "beard",
            Self::Spectacles => "spectacles",
            Self::Acne => "acne",
            Self::Skin => "skin",
            Self::Wrinkles => "wrinkles",
        }
    }

    /// Label printed in front of the advisory block in the report.
    pub fn report_label(&self) -> &'static str {
        match self {
            Self::Hairstyle => "BEST HAIRSTYLES:",
            Self::Beard => "BEST BEARD:",
            Self::Spectacles => "BEST SPECTACLES:",
            Self::Acne => "ACNE PREDICTIONS:",
            Self::Skin => "SKIN TYPE:",
            Self::Wrinkles => "WRINKLE:",
        }
    }
}

impl fmt::Display for AdvisoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the prompt for `kind` from the analysis fields it depends on.
pub fn build_prompt(kind: AdvisoryKind, analysis: &AnalysisResult) -> String {
    let face_shape = analysis.face_shape.as_deref().unwrap_or(UNKNOWN_FIELD);
    match kind {
        AdvisoryKind::Hairstyle => face_shape_prompt(face_shape, "Best Hairstyles", "Hairstyle"),
        AdvisoryKind::Beard => face_shape_prompt(face_shape, "Best Beard Styles", "Beard Style"),
        AdvisoryKind::Spectacles => {
            face_shape_prompt(face_shape, "Best Spectacles", "Spectacle Type")
        }
        AdvisoryKind::Acne => {
            let acne = analysis
                .acne_prediction
                .map(|v| v.to_string())
                .unwrap_or_else(|| UNKNOWN_FIELD.to_string());
            format!(
                "Acne Prediction:-\n\
                 Acne : {acne}\n\
                 If Acne > 1 than provide the vitamine deficiency which could cause this \
                 and give a diet plan according to it else just say you have clear skin\n\
                 {ANSWER_CONSTRAINT}"
            )
        }
        AdvisoryKind::Skin => {
            let skin = analysis.skin_type.as_deref().unwrap_or(UNKNOWN_FIELD);
            format!(
                "SkinType:-\n\
                 {skin} - First tell if it exist\n\
                 Give potential vitamin/mineral needs and related food sources If person \
                 have oily/dry skin else You have Normal Skin.{skin}.\n\
                 {ANSWER_CONSTRAINT}"
            )
        }
        AdvisoryKind::Wrinkles => {
            let wrinkles = analysis.wrinkles.as_deref().unwrap_or(UNKNOWN_FIELD);
            format!(
                "Wrinkle\n\
                 {wrinkles} - First tell if it exist\n\
                 Give potential vitamin/mineral needs and related food sources If person \
                 have wrinkle else no wrinkle found.{wrinkles}\n\
                 {ANSWER_CONSTRAINT}"
            )
        }
    }
}

fn face_shape_prompt(face_shape: &str, heading: &str, item: &str) -> String {
    format!(
        "Based on the provided FaceShape ({face_shape}), suggest the following details clearly:\n\
         FACESHAPE: {face_shape}\n\
         {heading}:-\n\
         1. [{item} 1]\n\
         2. [{item} 2]\n\
         {ANSWER_CONSTRAINT}"
    )
}
