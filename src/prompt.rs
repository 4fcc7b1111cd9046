//! Prompt construction and the expansion of one base prompt into the
//! sixteen image descriptors of a project.

use serde::Serialize;

use crate::types::{Emotion, Variant, EMOTION_COUNT, SURPRISE_COUNT};

/// Surprise scenario templates, by index.
const SURPRISE_TEMPLATES: [&str; SURPRISE_COUNT] = [
    "sitting in a cozy cafe holding a steaming cup, warm afternoon light",
    "wearing a tiny party hat and blowing a party horn, confetti everywhere",
    "sleeping curled up on a cloud, moon and stars in the background",
    "playing in the rain with a small umbrella, puddles splashing",
    "reading a huge book in a library, glasses on the nose",
    "cheering with a trophy held high, golden sparkles",
    "waving goodbye with a big heart-shaped balloon",
];

/// Expression fragment appended for each emotion.
pub fn emotion_template(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Happy => "happy expression, bright eyes, big smile, cheerful pose",
        Emotion::Sad => "sad expression, teary eyes, drooping shoulders, small frown",
        Emotion::Angry => "angry expression, furrowed brows, puffed cheeks, clenched fists",
        Emotion::Surprised => "surprised expression, wide eyes, open mouth, raised eyebrows",
        Emotion::Thinking => "thinking expression, hand on chin, eyes looking up, question mark",
        Emotion::Shy => "shy expression, blushing cheeks, looking away, fidgeting hands",
        Emotion::Proud => "proud expression, chin up, confident smile, hands on hips",
        Emotion::Tired => "tired expression, half-closed eyes, yawning, slouched posture",
        Emotion::Love => "loving expression, heart eyes, rosy cheeks, hugging a heart",
    }
}

/// Scenario fragment for a surprise index, or `None` outside `0..7`.
pub fn surprise_template(index: u8) -> Option<&'static str> {
    SURPRISE_TEMPLATES.get(index as usize).copied()
}

/// Merge the user's description with an optional style template and addendum.
///
/// The style is appended after the description so the user's own words lead.
pub fn merge_prompt(content: &str, style_template: Option<&str>, addendum: Option<&str>) -> String {
    let mut prompt = content.trim().to_string();
    for extra in [style_template, addendum].into_iter().flatten() {
        let extra = extra.trim();
        if !extra.is_empty() {
            prompt.push_str(", ");
            prompt.push_str(extra);
        }
    }
    prompt
}

pub fn build_emotion(base_prompt: &str, emotion: Emotion) -> String {
    format!("{}, {}", base_prompt, emotion_template(emotion))
}

/// # Panics
///
/// Panics if `index` is not a valid surprise index; callers only pass `0..7`.
pub fn build_surprise(base_prompt: &str, index: u8) -> String {
    let template = surprise_template(index)
        .unwrap_or_else(|| panic!("surprise index {} out of range", index));
    format!("{}, {}", base_prompt, template)
}

/// One unit of generation work produced from a base prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub variant: Variant,
    pub prompt: String,
}

impl TaskDescriptor {
    pub fn seed(&self, base: i64) -> i64 {
        self.variant.seed(base)
    }
}

/// Expand a fully merged prompt into nine emotion descriptors (canonical
/// order) followed by seven surprise descriptors (index order).
pub fn build_tasks(base_prompt: &str) -> Vec<TaskDescriptor> {
    let emotions = Emotion::ALL.iter().map(|&emotion| TaskDescriptor {
        variant: Variant::Emotion { emotion },
        prompt: build_emotion(base_prompt, emotion),
    });
    let surprises = (0..SURPRISE_COUNT as u8).map(|index| TaskDescriptor {
        variant: Variant::Surprise { index },
        prompt: build_surprise(base_prompt, index),
    });

    let tasks: Vec<TaskDescriptor> = emotions.chain(surprises).collect();
    debug_assert_eq!(tasks.len(), EMOTION_COUNT + SURPRISE_COUNT);
    tasks
}
