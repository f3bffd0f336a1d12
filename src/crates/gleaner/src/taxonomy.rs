//! Static domain taxonomy: upper ontology, categories with ORP roles, and
//! keyword-based category lookup for domain names.
//!
//! The full ~300-domain taxonomy is external reference data; this module
//! carries the category layer the writer needs to annotate Concepts.

use serde::Serialize;

/// The three upper-ontology branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpperOntology {
    Entities,
    Relations,
    EventsProcesses,
}

impl UpperOntology {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpperOntology::Entities => "entities",
            UpperOntology::Relations => "relations",
            UpperOntology::EventsProcesses => "events_processes",
        }
    }

    /// The ORP role played by concepts under this branch.
    pub fn orp_role(&self) -> &'static str {
        match self {
            UpperOntology::Entities => "Objects",
            UpperOntology::Relations => "Relations",
            UpperOntology::EventsProcesses => "Processes",
        }
    }
}

/// One category of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Category {
    pub key: &'static str,
    pub label: &'static str,
    pub upper_ontology: UpperOntology,
}

impl Category {
    pub fn orp_role(&self) -> &'static str {
        self.upper_ontology.orp_role()
    }
}

/// The twelve categories.
pub const CATEGORIES: &[Category] = &[
    Category {
        key: "mathematics",
        label: "Mathematics & Computational Sciences",
        upper_ontology: UpperOntology::Relations,
    },
    Category {
        key: "natural_sciences",
        label: "Natural Sciences",
        upper_ontology: UpperOntology::Entities,
    },
    Category {
        key: "engineering",
        label: "Engineering & Applied Sciences",
        upper_ontology: UpperOntology::Relations,
    },
    Category {
        key: "social_sciences",
        label: "Social Sciences & Human Behavior",
        upper_ontology: UpperOntology::Entities,
    },
    Category {
        key: "history",
        label: "History & Cultural Studies",
        upper_ontology: UpperOntology::EventsProcesses,
    },
    Category {
        key: "languages_literature",
        label: "Languages & Literature",
        upper_ontology: UpperOntology::EventsProcesses,
    },
    Category {
        key: "arts",
        label: "Arts, Music & Performance",
        upper_ontology: UpperOntology::EventsProcesses,
    },
    Category {
        key: "business_economics",
        label: "Business, Economics & Law",
        upper_ontology: UpperOntology::EventsProcesses,
    },
    Category {
        key: "health_medicine",
        label: "Health & Medicine",
        upper_ontology: UpperOntology::Entities,
    },
    Category {
        key: "philosophy_religion",
        label: "Philosophy, Religion & Ethics",
        upper_ontology: UpperOntology::Relations,
    },
    Category {
        key: "vocational",
        label: "Applied & Vocational Skills",
        upper_ontology: UpperOntology::EventsProcesses,
    },
    Category {
        key: "interdisciplinary",
        label: "Interdisciplinary & Emerging Fields",
        upper_ontology: UpperOntology::EventsProcesses,
    },
];

/// Look up a category by key.
pub fn category(key: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.key == key)
}

/// Keyword tables for domain-name classification, checked in order.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "mathematics",
        &[
            "math",
            "algebra",
            "calculus",
            "geometry",
            "statistics",
            "computer science",
            "programming",
        ],
    ),
    (
        "natural_sciences",
        &[
            "biology",
            "chemistry",
            "physics",
            "earth science",
            "astronomy",
            "geology",
        ],
    ),
    (
        "social_sciences",
        &["psychology", "sociology", "political", "geography"],
    ),
    ("history", &["history"]),
    (
        "languages_literature",
        &["language", "literature", "writing", "reading"],
    ),
    ("arts", &["art", "music", "theater", "dance", "performance"]),
    (
        "business_economics",
        &["business", "economics", "law", "finance"],
    ),
    (
        "health_medicine",
        &["health", "medicine", "medical", "nursing"],
    ),
    (
        "philosophy_religion",
        &["philosophy", "religion", "ethics", "logic"],
    ),
    (
        "vocational",
        &["vocational", "trade", "culinary", "automotive"],
    ),
];

/// Classify a domain name into a category. Unknown domains land in
/// interdisciplinary.
pub fn category_by_domain(domain_name: &str) -> &'static Category {
    let domain_lower = domain_name.to_lowercase();
    for (key, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| domain_lower.contains(kw)) {
            if let Some(cat) = category(key) {
                return cat;
            }
        }
    }
    category("interdisciplinary").expect("interdisciplinary category exists")
}
