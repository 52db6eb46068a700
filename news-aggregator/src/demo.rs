use crate::types::Article;

/// Fixed articles shown while an account has no feeds configured.
pub fn sample_articles() -> Vec<Article> {
    vec![
        Article {
            title: "Cybersecurity Alert: New Malware Detected".to_string(),
            description: "A new malware targeting enterprise networks has been uncovered by researchers."
                .to_string(),
            content: "Detailed blog post about the malware, its effects, and mitigation strategies."
                .to_string(),
            source_label: "CyberSec News".to_string(),
            published_at: "2024-11-25".to_string(),
            link: String::new(),
            origin_source: None,
        },
        Article {
            title: "Top 10 Open Source Tools for Investigations".to_string(),
            description: "Explore the most useful free tools for cyber threat analysis.".to_string(),
            content: "A comprehensive list of tools along with their features and how to use them."
                .to_string(),
            source_label: "TechRadar".to_string(),
            published_at: "2024-11-20".to_string(),
            link: String::new(),
            origin_source: None,
        },
    ]
}
