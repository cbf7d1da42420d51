use morgue_model::DeathRecord;

pub const SYSTEM_PROMPT: &str = "You extract structured facts about on-screen character deaths in films. \
Respond with JSON only. Never invent deaths that the provided text does not support.";

const RECORD_SHAPE: &str = r#"[{"character": "string", "timeOfDeath": "string", "cause": "string", "killedBy": "string or N/A", "context": "string", "isAmbiguous": false}]"#;

/// Enrichment prompt: keep every parsed death and fill in detail from the plot.
pub fn enrichment_prompt(
    title: &str,
    year: i32,
    deaths: &[DeathRecord],
    plot_summary: &str,
) -> String {
    let listed = serde_json::to_string_pretty(deaths).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Film: {title} ({year})\n\n\
         Below is the complete list of {count} character deaths in this film, followed by a plot summary.\n\
         For EVERY death in the list, fill in \"timeOfDeath\" (when in the film it happens) and \"context\" \
         (what is going on in the story), and check that \"killedBy\" and \"isAmbiguous\" are correct.\n\
         Do not omit, merge or reorder any death. Return exactly {count} objects.\n\n\
         Deaths:\n{listed}\n\n\
         Plot summary:\n{plot_summary}\n\n\
         Respond with a JSON array shaped like:\n{RECORD_SHAPE}",
        count = deaths.len(),
    )
}

/// Full extraction prompt: build the list from narrative text alone.
pub fn extraction_prompt(title: &str, year: i32, narrative: &str) -> String {
    format!(
        "Film: {title} ({year})\n\n\
         Read the text below and list every character who dies in this film.\n\
         Use \"N/A\" for killedBy when nobody is responsible, and set isAmbiguous to true when the death \
         happens off-screen or is uncertain. If nobody dies, return [].\n\n\
         Text:\n{narrative}\n\n\
         Respond with a JSON array shaped like:\n{RECORD_SHAPE}"
    )
}

/// Short yes/no check that scraped content covers the requested release.
pub fn confirmation_prompt(title: &str, year: i32, director: &str, excerpt: &str) -> String {
    format!(
        "Does the following text describe the film \"{title}\" ({year}) directed by {director}, \
         and not a remake, sequel or other work with the same name? Answer YES or NO only.\n\n{excerpt}"
    )
}

/// Anything other than an explicit "no" keeps the content.
pub fn is_rejection(answer: &str) -> bool {
    let first_word: String = answer
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    first_word.eq_ignore_ascii_case("no")
}
