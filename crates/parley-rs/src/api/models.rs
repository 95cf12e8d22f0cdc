//! Chat-model catalog filtering.
//!
//! The provider's model listing mixes chat models with embedding, audio,
//! realtime and image models. [`chat_models`] keeps the ids a chat session
//! can actually use, sorted for display.

/// Id fragments that mark a model as unsuitable for chat.
const EXCLUDED_FRAGMENTS: [&str; 7] = [
    "embedding",
    "audio",
    "search",
    "realtime",
    "preview",
    "transcribe",
    "tts",
];

/// Whether `id` names a general-purpose chat model.
pub fn is_chat_model(id: &str) -> bool {
    if EXCLUDED_FRAGMENTS.iter().any(|f| id.contains(f)) {
        return false;
    }
    id.starts_with("gpt-") && !id.contains("instruct") && id != "gpt-image-1"
}

/// Filter and sort a raw id listing.
pub fn chat_models<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = ids
        .into_iter()
        .filter(|id| is_chat_model(id.as_ref()))
        .map(|id| id.as_ref().to_string())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_non_chat_models() {
        let ids = [
            "gpt-4o",
            "text-embedding-3-small",
            "gpt-4o-audio-preview",
            "gpt-4o-mini",
            "gpt-3.5-turbo-instruct",
            "gpt-image-1",
            "gpt-4o-realtime-preview",
            "gpt-4o-mini-tts",
            "whisper-1",
            "gpt-4.1",
            "gpt-4o-search-preview",
        ];
        assert_eq!(chat_models(ids), vec!["gpt-4.1", "gpt-4o", "gpt-4o-mini"]);
    }

    #[test]
    fn duplicates_collapse() {
        assert_eq!(chat_models(["gpt-4o", "gpt-4o"]), vec!["gpt-4o"]);
    }
}
