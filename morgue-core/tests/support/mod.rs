#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use morgue_core::PipelineConfig;
use morgue_core::extract::{GenerationError, TextGenerator};
use morgue_core::pipeline::Pipeline;
use morgue_core::scrape::{ContentSource, SourceDocument};
use morgue_core::testing::{
    FakeMovie, InMemoryStore, ScriptedGenerator, StaticMetadataCatalog, StaticSource, fast_config,
};

pub const JAWS_TMDB_ID: u64 = 578;

pub const JAWS_WIKI: &str = "\
'''Jaws''' is a 1975 thriller directed by Steven Spielberg.
== Victims ==
* '''Chrissie Watkins''' - Eaten by the shark
** First victim of the film
* [[Alex Kintner]] - Killed by the shark
* '''Ben Gardner''' - Killed by the shark (off-screen)
* '''Quint''' - Eaten by the shark
== Trivia ==
* Not a victim
";

pub const JAWS_VICTIMS: &str = "\
* '''Chrissie Watkins''' - Eaten by the shark
** First victim of the film
* [[Alex Kintner]] - Killed by the shark
* '''Ben Gardner''' - Killed by the shark (off-screen)
* '''Quint''' - Eaten by the shark";

pub const JAWS_PLOT: &str = "Police chief Martin Brody hunts a great white shark terrorising Amity Island.";

pub fn jaws() -> FakeMovie {
    FakeMovie::new(JAWS_TMDB_ID, "Jaws", "1975-06-20", "Steven Spielberg")
}

pub fn jaws_wiki() -> Arc<StaticSource> {
    Arc::new(StaticSource::new("wiki").with_page("Jaws", JAWS_WIKI, Some(JAWS_VICTIMS)))
}

pub fn jaws_encyclopedia() -> Arc<StaticSource> {
    Arc::new(StaticSource::new("encyclopedia").with_page(
        "Jaws (1975)",
        "Jaws is a 1975 American thriller film directed by Steven Spielberg.",
        Some(JAWS_PLOT),
    ))
}

/// A source whose fetch panics mid-request.
pub struct ExplodingSource;

#[async_trait]
impl ContentSource for ExplodingSource {
    fn name(&self) -> &'static str {
        "wiki"
    }

    async fn fetch(&self, _page_title: &str) -> morgue_core::Result<Option<SourceDocument>> {
        panic!("wiki client exploded")
    }
}

/// Collaborators a test may want to inspect after running a pipeline.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub metadata: Arc<StaticMetadataCatalog>,
    pub pipeline: Pipeline,
}

pub struct HarnessBuilder {
    movies: Vec<FakeMovie>,
    structured: Vec<Arc<dyn ContentSource>>,
    narrative: Vec<Arc<dyn ContentSource>>,
    generator: Option<Arc<dyn TextGenerator>>,
    config: PipelineConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            movies: vec![jaws()],
            structured: Vec::new(),
            narrative: Vec::new(),
            generator: None,
            config: fast_config(),
        }
    }

    pub fn movies(mut self, movies: Vec<FakeMovie>) -> Self {
        self.movies = movies;
        self
    }

    pub fn structured(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.structured.push(source);
        self
    }

    pub fn narrative(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.narrative.push(source);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Harness {
        let store = InMemoryStore::new();
        let metadata = StaticMetadataCatalog::new(self.movies);
        let pipeline = morgue_core::testing::pipeline(
            store.clone(),
            metadata.clone(),
            self.structured,
            self.narrative,
            self.generator,
            self.config,
        );
        Harness {
            store,
            metadata,
            pipeline,
        }
    }
}

pub fn generator(
    responses: impl IntoIterator<Item = Result<String, GenerationError>>,
) -> Arc<ScriptedGenerator> {
    ScriptedGenerator::new(responses)
}

/// JSON array of `count` generated deaths.
pub fn generated_deaths(count: usize) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"character": "Victim {i}", "timeOfDeath": "Act {i}", "cause": "Shark", "killedBy": "The shark", "context": "At sea", "isAmbiguous": false}}"#
            )
        })
        .collect();
    format!("[{}]", items.join(", "))
}
