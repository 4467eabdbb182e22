//! Match tags and human-readable explanations.

use vitrine_core::ProductRecord;

use crate::fusion::MatchScores;

const COLORS: &[&str] = &[
    "red", "blue", "green", "black", "white", "yellow", "pink", "purple",
];

const STYLES: &[&str] = &["elegant", "casual", "formal", "modern", "vintage", "classic"];

const SEPARATOR: &str = " • ";

/// Short tags describing why a product matched.
///
/// `score` is the final score; text tags need a query text.
pub fn match_tags(product: &ProductRecord, query_text: Option<&str>, score: f32) -> Vec<String> {
    let mut tags = Vec::new();

    if score > 0.9 {
        tags.push("excellent-match");
    } else if score > 0.8 {
        tags.push("great-match");
    } else if score > 0.7 {
        tags.push("good-match");
    }

    if let Some(query) = query_text {
        let query = query.to_lowercase();
        let title = product.title.to_lowercase();
        let description = product
            .description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        if title.contains(&query) {
            tags.push("title-match");
        }
        if !description.is_empty() && description.contains(&query) {
            tags.push("description-match");
        }
        if COLORS
            .iter()
            .any(|c| query.contains(c) && title.contains(c))
        {
            tags.push("color-match");
        }
        if STYLES
            .iter()
            .any(|s| query.contains(s) && (title.contains(s) || description.contains(s)))
        {
            tags.push("style-match");
        }
    }

    if score > 0.75 {
        tags.push("visual-match");
    }

    tags.into_iter().map(String::from).collect()
}

/// One-line explanation, parts joined with `" • "`.
///
/// ```
/// use vitrine_core::ProductRecord;
/// use vitrine_rank::explain::explanation;
/// use vitrine_rank::MatchScores;
///
/// let product = ProductRecord::new("p1", "Gold Watch").with_category("Watch");
/// let text = explanation(&product, Some("gold watch"), false, 0.93, &MatchScores::default());
/// assert_eq!(text, "Excellent match • Matches query keywords • In Watch category");
/// ```
pub fn explanation(
    product: &ProductRecord,
    query_text: Option<&str>,
    has_image: bool,
    score: f32,
    scores: &MatchScores,
) -> String {
    let mut parts: Vec<String> = vec![quality_label(score).to_string()];

    match (has_image, query_text) {
        (true, Some(_)) => {
            if scores.image_contribution > 0.6 {
                parts.push(format!(
                    "Strong visual similarity ({:.0}%)",
                    scores.image_contribution * 100.0
                ));
            }
            if scores.text_contribution > 0.4 {
                parts.push(format!(
                    "Matches text query ({:.0}%)",
                    scores.text_contribution * 100.0
                ));
            }
            if scores.image_text_alignment.unwrap_or(0.0) > 0.7 {
                parts.push("Image and text are well-aligned".to_string());
            }
        }
        (true, None) => parts.push("Visually similar to your image".to_string()),
        (false, Some(query)) => {
            let title = product.title.to_lowercase();
            let query = query.to_lowercase();
            if query.split_whitespace().take(3).any(|kw| title.contains(kw)) {
                parts.push("Matches query keywords".to_string());
            }
        }
        (false, None) => {}
    }

    if let Some(query) = query_text
        && !product.category.is_empty()
        && query.to_lowercase().contains(&product.category.to_lowercase())
    {
        parts.push(format!("In {} category", product.category));
    }

    parts.join(SEPARATOR)
}

fn quality_label(score: f32) -> &'static str {
    if score > 0.9 {
        "Excellent match"
    } else if score > 0.75 {
        "Very good match"
    } else if score > 0.6 {
        "Good match"
    } else {
        "Moderate match"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dress() -> ProductRecord {
        ProductRecord::new("p1", "Elegant Red Evening Dress")
            .with_category("Dresses")
            .with_description("A formal red dress")
    }

    fn both(image: f32, alignment: f32) -> MatchScores {
        MatchScores {
            image_contribution: image,
            text_contribution: 1.0 - image,
            image_text_alignment: Some(alignment),
            fusion_quality: Some(0.8),
        }
    }

    #[test]
    fn test_score_tags() {
        let p = ProductRecord::new("p", "Lamp");
        assert_eq!(match_tags(&p, None, 0.95), vec!["excellent-match", "visual-match"]);
        assert_eq!(match_tags(&p, None, 0.85), vec!["great-match", "visual-match"]);
        assert_eq!(match_tags(&p, None, 0.72), vec!["good-match"]);
        assert!(match_tags(&p, None, 0.5).is_empty());
    }

    #[test]
    fn test_text_tags() {
        let tags = match_tags(&dress(), Some("Red Evening Dress"), 0.5);
        assert_eq!(tags, vec!["title-match", "color-match"]);

        let tags = match_tags(&dress(), Some("formal red"), 0.5);
        assert_eq!(tags, vec!["description-match", "color-match", "style-match"]);
    }

    #[test]
    fn test_style_tag_from_description() {
        let p = ProductRecord::new("p", "Blazer").with_description("Vintage wool");
        assert_eq!(match_tags(&p, Some("vintage jacket"), 0.1), vec!["style-match"]);
    }

    #[test]
    fn test_explanation_multimodal() {
        let text = explanation(&dress(), Some("red dress"), true, 0.8, &both(0.7, 0.75));
        assert_eq!(
            text,
            "Very good match • Strong visual similarity (70%) • Image and text are well-aligned"
        );

        let text = explanation(&dress(), Some("red dress"), true, 0.65, &both(0.5, 0.2));
        assert_eq!(text, "Good match • Matches text query (50%)");
    }

    #[test]
    fn test_explanation_image_only() {
        let scores = MatchScores {
            image_contribution: 1.0,
            ..MatchScores::default()
        };
        let text = explanation(&dress(), None, true, 0.4, &scores);
        assert_eq!(text, "Moderate match • Visually similar to your image");
    }

    #[test]
    fn test_explanation_text_only_with_category() {
        let text = explanation(&dress(), Some("evening dresses"), false, 0.62, &MatchScores::default());
        assert_eq!(text, "Good match • Matches query keywords • In Dresses category");

        let text = explanation(&dress(), Some("boots"), false, 0.3, &MatchScores::default());
        assert_eq!(text, "Moderate match");
    }
}
