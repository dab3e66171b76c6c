//! Content briefs: the immutable input to one pipeline run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Category of content to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Long-form guide for a destination.
    DestinationGuide,
    /// Article about a bookable activity or experience.
    ActivityArticle,
    /// Keyword-targeted landing page.
    SeoLandingPage,
    /// Editorial blog post.
    BlogPost,
    /// Short-form product description.
    ProductDescription,
}

impl ContentType {
    /// Stable label used in prompts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::DestinationGuide => "destination_guide",
            ContentType::ActivityArticle => "activity_article",
            ContentType::SeoLandingPage => "seo_landing_page",
            ContentType::BlogPost => "blog_post",
            ContentType::ProductDescription => "product_description",
        }
    }
}

/// Voice the generated text should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Informative,
    Persuasive,
    Playful,
    Luxury,
    Practical,
}

impl Tone {
    /// Stable label used in prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Informative => "informative",
            Tone::Persuasive => "persuasive",
            Tone::Playful => "playful",
            Tone::Luxury => "luxury",
            Tone::Practical => "practical",
        }
    }
}

/// Target word-count window for the body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    /// Minimum words, exclusive of zero.
    pub min: u32,
    /// Maximum words; must be at least `min`.
    pub max: u32,
}

impl LengthRange {
    /// Create a range. Validity is checked by [`ContentBrief::validate`].
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    fn is_valid(&self) -> bool {
        self.min > 0 && self.min <= self.max
    }
}

impl Default for LengthRange {
    fn default() -> Self {
        Self {
            min: 600,
            max: 1200,
        }
    }
}

/// A structured content request.
///
/// Created by the caller and never mutated for the lifetime of a pipeline
/// run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBrief {
    /// Unique brief identifier.
    pub id: String,
    /// Category of content requested.
    pub content_type: ContentType,
    /// Site the content belongs to.
    pub site_id: String,
    /// Primary keyword the content must target.
    pub target_keyword: String,
    /// Secondary keywords, in priority order.
    pub secondary_keywords: Vec<String>,
    /// Destination the content covers, when applicable.
    pub destination: Option<String>,
    /// Category within the site taxonomy.
    pub category: Option<String>,
    /// Bookable experience the content promotes.
    pub experience_id: Option<String>,
    /// Voice to write in.
    pub tone: Tone,
    /// Target body length in words.
    pub target_length: LengthRange,
    /// Free-form facts for factual grounding, keyed by label.
    pub source_data: BTreeMap<String, String>,
    /// Brand-voice notes injected into prompts verbatim.
    pub brand_voice: Option<String>,
}

impl ContentBrief {
    /// Create a brief with defaults for everything optional.
    pub fn new(
        content_type: ContentType,
        site_id: impl Into<String>,
        target_keyword: impl Into<String>,
    ) -> Self {
        Self {
            id: super::next_id("brief"),
            content_type,
            site_id: site_id.into(),
            target_keyword: target_keyword.into(),
            secondary_keywords: Vec::new(),
            destination: None,
            category: None,
            experience_id: None,
            tone: Tone::Informative,
            target_length: LengthRange::default(),
            source_data: BTreeMap::new(),
            brand_voice: None,
        }
    }

    /// Set the secondary keywords.
    pub fn with_secondary_keywords(mut self, keywords: Vec<String>) -> Self {
        self.secondary_keywords = keywords;
        self
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Set the site category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the experience id.
    pub fn with_experience_id(mut self, experience_id: impl Into<String>) -> Self {
        self.experience_id = Some(experience_id.into());
        self
    }

    /// Set the tone.
    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    /// Set the target length window.
    pub fn with_target_length(mut self, range: LengthRange) -> Self {
        self.target_length = range;
        self
    }

    /// Add one grounding fact.
    pub fn with_source_fact(
        mut self,
        label: impl Into<String>,
        fact: impl Into<String>,
    ) -> Self {
        self.source_data.insert(label.into(), fact.into());
        self
    }

    /// Set brand-voice notes.
    pub fn with_brand_voice(mut self, notes: impl Into<String>) -> Self {
        self.brand_voice = Some(notes.into());
        self
    }

    /// Check structural validity, reporting the first problem found.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.target_keyword.trim().is_empty() {
            return Err(GenerationError::InvalidBrief {
                reason: "target keyword is empty".to_owned(),
            });
        }
        if self.site_id.trim().is_empty() {
            return Err(GenerationError::InvalidBrief {
                reason: "site id is empty".to_owned(),
            });
        }
        if !self.target_length.is_valid() {
            return Err(GenerationError::InvalidBrief {
                reason: format!(
                    "target length {}..{} is not a positive, ordered range",
                    self.target_length.min, self.target_length.max
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_brief() -> ContentBrief {
        ContentBrief::new(ContentType::DestinationGuide, "site-1", "things to do in lisbon")
    }

    #[test]
    fn test_brief_defaults() {
        let brief = sample_brief();
        assert_eq!(brief.tone, Tone::Informative);
        assert_eq!(brief.target_length, LengthRange::default());
        assert!(brief.secondary_keywords.is_empty());
        assert!(brief.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let brief = sample_brief()
            .with_tone(Tone::Playful)
            .with_destination("Lisbon")
            .with_secondary_keywords(vec!["lisbon attractions".to_owned()])
            .with_source_fact("population", "548,000")
            .with_brand_voice("short sentences, second person");

        assert_eq!(brief.tone, Tone::Playful);
        assert_eq!(brief.destination.as_deref(), Some("Lisbon"));
        assert_eq!(brief.secondary_keywords.len(), 1);
        assert_eq!(brief.source_data.get("population").map(String::as_str), Some("548,000"));
        assert!(brief.brand_voice.is_some());
    }

    #[test]
    fn test_validate_rejects_empty_keyword() {
        let mut brief = sample_brief();
        brief.target_keyword = "  ".to_owned();
        assert!(matches!(
            brief.validate(),
            Err(GenerationError::InvalidBrief { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_length() {
        let brief = sample_brief().with_target_length(LengthRange::new(800, 400));
        assert!(brief.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_minimum() {
        let brief = sample_brief().with_target_length(LengthRange::new(0, 400));
        assert!(brief.validate().is_err());
    }

    #[test]
    fn test_content_type_labels() {
        assert_eq!(ContentType::SeoLandingPage.as_str(), "seo_landing_page");
        assert_eq!(Tone::Luxury.as_str(), "luxury");
    }
}
