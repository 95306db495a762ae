//! Keyword intent table behind the assistant's canned answers
//!
//! An ordered list of rules evaluated first-match-wins against the
//! lower-cased input. The table is the assistant's only source of
//! knowledge; anything it cannot match gets a fallback that echoes the
//! question back and asks for more detail.

use crate::model::Suggestion;

/// A keyword-triggered canned response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRule {
    keywords: Vec<String>,
    response: String,
}

impl IntentRule {
    /// Keywords are lower-cased here so matching only lowers the input
    pub fn new<K, S>(keywords: K, response: impl Into<String>) -> Self
    where
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            response: response.into(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    /// Substring match against already lower-cased input
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Ordered intent rules, first match wins
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntentTable {
    rules: Vec<IntentRule>,
}

impl IntentTable {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// The farming knowledge table shipped with the dashboard
    pub fn agriculture() -> Self {
        Self::new(vec![
            IntentRule::new(["weather", "forecast", "rain"], WEATHER_RESPONSE),
            IntentRule::new(["disease", "pest", "infection"], DISEASE_RESPONSE),
            IntentRule::new(["soil", "ph", "testing"], SOIL_RESPONSE),
            IntentRule::new(["water", "irrigation", "drought"], WATER_RESPONSE),
            IntentRule::new(["organic", "natural", "chemical free"], ORGANIC_RESPONSE),
        ])
    }

    #[cfg(test)]
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// First rule whose keywords occur in `input`, ignoring case
    pub fn classify(&self, input: &str) -> Option<&IntentRule> {
        let lowered = input.to_lowercase();
        self.rules.iter().find(|rule| rule.matches(&lowered))
    }

    /// Canned answer for `input`, or the fallback echoing it back.
    ///
    /// Pure: the same input always produces the same answer.
    pub fn respond(&self, input: &str) -> String {
        self.classify(input)
            .map_or_else(|| fallback_response(input), |rule| rule.response.clone())
    }
}

pub const WEATHER_RESPONSE: &str = "Based on your farm's location, we're expecting moderate rainfall in the next 48 hours. Consider delaying any spraying operations and ensure proper drainage in low-lying areas.";

pub const DISEASE_RESPONSE: &str = "To identify common plant diseases, look for yellowing leaves, spots, wilting, or unusual growth. Upload a photo of your affected plant for more specific diagnosis.";

pub const SOIL_RESPONSE: &str = "Regular soil testing every 2-3 years is recommended. The ideal pH for most crops is between 6.0 and 7.0. We can help arrange soil testing services through our AgriSmart partners.";

pub const WATER_RESPONSE: &str = "Consider drip irrigation for row crops to reduce water usage by up to 60%. Morning watering (5-10am) maximizes absorption and minimizes evaporation.";

pub const ORGANIC_RESPONSE: &str = "For organic farming, focus on crop rotation, companion planting, and natural predators. Our database shows compost and neem-based solutions work well in your agricultural zone.";

/// First assistant turn of every transcript
pub const GREETING: &str =
    "Hello, I'm your AgriSmart Assistant. How can I help with your farming needs today?";

/// Answer for questions no rule matches
pub fn fallback_response(input: &str) -> String {
    format!(
        "I understand you're asking about {input}. As your AgriSmart assistant, I can provide \
         specific guidance on crop management, pest control, weather adaptation, and sustainable \
         farming practices. Could you provide more details about your farm size, current crops, \
         and specific challenges?"
    )
}

const SUGGESTIONS: &[(&str, &str)] = &[
    ("1", "Weather forecast for my crops"),
    ("2", "Best practices for organic farming"),
    ("3", "How to identify plant diseases"),
    ("4", "Soil testing recommendations"),
    ("5", "Water conservation techniques"),
];

/// Suggested questions shown under the chat input
pub fn suggestions() -> Vec<Suggestion> {
    SUGGESTIONS
        .iter()
        .map(|(id, text)| Suggestion {
            id: (*id).to_string(),
            text: (*text).to_string(),
        })
        .collect()
}

/// Look up a suggestion by id
pub fn find_suggestion(id: &str) -> Option<Suggestion> {
    suggestions().into_iter().find(|s| s.id == id)
}
