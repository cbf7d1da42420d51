//! Deterministic parser for wiki victim lists.
//!
//! The accepted wiki section is a bulleted list:
//!
//! ```text
//! * '''Chrissie Watkins''' - Eaten by the shark
//! ** First victim of the film
//! * [[Alex Kintner]] - Killed by the shark while on his raft
//! ```
//!
//! Each top-level bullet becomes one [`DeathRecord`]; second-level bullets
//! directly beneath it are joined into its context.

use morgue_model::{DeathRecord, NOT_APPLICABLE, UNKNOWN};
use once_cell::sync::Lazy;
use regex::Regex;

const SEPARATOR: &str = " - ";
const CONTEXT_JOINER: &str = "; ";
const HEDGE_WORDS: [&str; 5] = [
    "off-screen",
    "mentioned",
    "uncertain",
    "debatable",
    "unknown if",
];

static REF_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<ref[^>]*/>|<ref[^>]*>.*?</ref>")
        .expect("ref tag regex should compile")
});
static HTML_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("html tag regex should compile"));
static TEMPLATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{[^{}]*\}\}").expect("template regex should compile")
});
static WIKI_LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]*)\]\]")
        .expect("wiki link regex should compile")
});
static EXTERNAL_LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:https?:)?//\S+(?:\s+([^\]]*))?\]")
        .expect("external link regex should compile")
});
static EMPHASIS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'{2,}").expect("emphasis regex should compile"));
static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

static KILLED_BY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:killed|murdered|shot|stabbed|slashed|eaten|devoured|mauled|bitten|decapitated|beheaded|strangled|impaled|crushed|poisoned|drowned|electrocuted|burned|incinerated|executed|attacked|hacked|bludgeoned|beaten|slaughtered|butchered|dismembered|disemboweled|gutted|torn|ripped|blown|run|gunned|hanged|infected|possessed|zapped|vaporized)(?:\s+(?:to death|dead|down|up|over|apart|in half|alive))?\s+(?:by|at the hands of)\s+(.+)",
    )
    .expect("killed-by regex should compile")
});
static TRAILING_NOISE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:\(.*|\bwith\b.*|\bin\s+\d{4}\b.*|[,;].*)$")
        .expect("trailing noise regex should compile")
});

/// Parse a victim-list section into death records.
pub fn parse_death_list(section: &str) -> Vec<DeathRecord> {
    let mut deaths = Vec::new();
    let mut current: Option<(DeathRecord, Vec<String>)> = None;

    for line in section.lines() {
        let depth = line.chars().take_while(|c| *c == '*').count();
        match depth {
            0 => {
                // Anything other than a bullet ends the sub-bullet run.
                if let Some(entry) = current.take() {
                    deaths.push(finish(entry));
                }
            }
            1 => {
                if let Some(entry) = current.take() {
                    deaths.push(finish(entry));
                }
                current = parse_bullet(&line[1..]).map(|death| (death, Vec::new()));
            }
            _ => {
                if let Some((_, context)) = current.as_mut() {
                    let text = strip_markup(&line[depth..]);
                    if !text.is_empty() {
                        context.push(text);
                    }
                }
            }
        }
    }

    if let Some(entry) = current.take() {
        deaths.push(finish(entry));
    }
    deaths
}

fn finish((mut death, context): (DeathRecord, Vec<String>)) -> DeathRecord {
    death.context = context.join(CONTEXT_JOINER);
    death
}

fn parse_bullet(raw: &str) -> Option<DeathRecord> {
    let (character, description) = match raw.split_once(SEPARATOR) {
        Some((character, description)) => (strip_markup(character), strip_markup(description)),
        None => (strip_markup(raw), String::new()),
    };

    if character.is_empty() {
        return None;
    }

    let mut death = DeathRecord::new(
        character,
        if description.is_empty() {
            UNKNOWN.to_string()
        } else {
            description.clone()
        },
    );
    death.killed_by = killed_by(&description);
    death.is_ambiguous = is_ambiguous(&description);
    Some(death)
}

/// Remove wiki and HTML markup, leaving readable text.
pub fn strip_markup(text: &str) -> String {
    let text = REF_TAG_REGEX.replace_all(text, "");
    let text = TEMPLATE_REGEX.replace_all(&text, "");
    let text = WIKI_LINK_REGEX.replace_all(&text, "$1");
    let text = EXTERNAL_LINK_REGEX.replace_all(&text, "$1");
    let text = HTML_TAG_REGEX.replace_all(&text, "");
    let text = EMPHASIS_REGEX.replace_all(&text, "");
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

/// Agent named after a death verb ("eaten by the shark" → "the shark"),
/// or `N/A` when the description names none.
pub fn killed_by(description: &str) -> String {
    let Some(captures) = KILLED_BY_REGEX.captures(description) else {
        return NOT_APPLICABLE.to_string();
    };
    let agent = captures.get(1).map_or("", |m| m.as_str());
    let agent = TRAILING_NOISE_REGEX.replace(agent, "");
    let agent = agent.trim().trim_end_matches(['.', '!', ':']).trim();

    if agent.is_empty() {
        NOT_APPLICABLE.to_string()
    } else {
        agent.to_string()
    }
}

pub fn is_ambiguous(description: &str) -> bool {
    let lowered = description.to_lowercase();
    HEDGE_WORDS.iter().any(|hedge| lowered.contains(hedge))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAWS_FIXTURE: &str = "\
* '''Chrissie Watkins''' - Eaten by the shark
** First victim of the film
** Attacked during a night swim
* [[Alex Kintner|Alex M. Kintner]] - Killed by [[Great white shark|the shark]] while on his raft
* ''Pipit'' - Mentioned as missing, presumably killed by the shark off-screen
* '''Ben Gardner''' - Killed by the shark (body found later)
* <u>Quint</u> - Eaten by the shark
Something unrelated
** stray sub-bullet
* Mr. Shark - Blown up by Brody with a scuba tank
";

    #[test]
    fn parses_one_entry_per_top_level_bullet() {
        let deaths = parse_death_list(JAWS_FIXTURE);
        assert_eq!(deaths.len(), 6);

        let names: Vec<&str> = deaths.iter().map(|d| d.character.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Chrissie Watkins",
                "Alex M. Kintner",
                "Pipit",
                "Ben Gardner",
                "Quint",
                "Mr. Shark"
            ]
        );
        for death in &deaths {
            for marker in ["'''", "''", "[[", "]]", "<u>", "</u>"] {
                assert!(!death.character.contains(marker));
                assert!(!death.cause.contains(marker));
            }
            assert_eq!(death.time_of_death, UNKNOWN);
        }
    }

    #[test]
    fn sub_bullets_become_context() {
        let deaths = parse_death_list(JAWS_FIXTURE);
        assert_eq!(
            deaths[0].context,
            "First victim of the film; Attacked during a night swim"
        );
        assert_eq!(deaths[1].context, "");
        // Separated from its bullet by prose, so it is not attached.
        assert_eq!(deaths[4].context, "");
    }

    #[test]
    fn killed_by_trims_trailing_noise() {
        let deaths = parse_death_list(JAWS_FIXTURE);
        assert_eq!(deaths[0].killed_by, "the shark");
        assert_eq!(deaths[1].killed_by, "the shark while on his raft");
        assert_eq!(deaths[3].killed_by, "the shark");
        assert_eq!(deaths[5].killed_by, "Brody");
        assert_eq!(killed_by("Shot at the hands of Hans Gruber in 1988."), "Hans Gruber");
        assert_eq!(killed_by("Dies of a heart attack"), NOT_APPLICABLE);
    }

    #[test]
    fn hedge_words_flag_ambiguity() {
        let deaths = parse_death_list(JAWS_FIXTURE);
        assert!(deaths[2].is_ambiguous);
        assert!(!deaths[0].is_ambiguous);
        assert!(is_ambiguous("It is unknown if he survived"));
    }

    #[test]
    fn bullet_without_separator_keeps_name() {
        let deaths = parse_death_list("* '''Hooper'''\n");
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].character, "Hooper");
        assert_eq!(deaths[0].cause, UNKNOWN);
        assert_eq!(deaths[0].killed_by, NOT_APPLICABLE);
    }

    #[test]
    fn strips_refs_templates_and_external_links() {
        assert_eq!(
            strip_markup("Shot<ref name=\"a\">cite</ref> {{cn}} by [https://x.org the sheriff]"),
            "Shot by the sheriff"
        );
    }
}
