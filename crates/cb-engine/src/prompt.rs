use cb_core::models::GenerationPrompt;
use cb_core::RecentTopics;

const THEME_SLOT: &str = "{theme}";
const RECENT_SLOT: &str = "{recent_topics}";

/// Fills the persona template with the chosen theme and the topics to avoid.
pub fn build_prompt(persona: &str, theme: &str, recent: &RecentTopics) -> GenerationPrompt {
    let avoid = if recent.is_empty() {
        "none".to_string()
    } else {
        recent.iter().collect::<Vec<_>>().join(", ")
    };

    GenerationPrompt {
        system: persona.replace(THEME_SLOT, theme).replace(RECENT_SLOT, &avoid),
        user: format!("Write a post about {theme}, avoiding the recent topics if you can."),
    }
}
