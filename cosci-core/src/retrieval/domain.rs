//! Research domain classification and per-domain prompt framing.

use serde::{Deserialize, Serialize};

/// Scientific domain of a research goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDomain {
    Medicine,
    Physics,
    Chemistry,
    ComputerScience,
    Biology,
    Psychology,
    Engineering,
    Mathematics,
    EnvironmentalScience,
    ClimateScience,
    #[default]
    General,
}

impl ResearchDomain {
    pub const ALL: [ResearchDomain; 11] = [
        Self::Medicine,
        Self::Physics,
        Self::Chemistry,
        Self::ComputerScience,
        Self::Biology,
        Self::Psychology,
        Self::Engineering,
        Self::Mathematics,
        Self::EnvironmentalScience,
        Self::ClimateScience,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medicine => "medicine",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::ComputerScience => "computer_science",
            Self::Biology => "biology",
            Self::Psychology => "psychology",
            Self::Engineering => "engineering",
            Self::Mathematics => "mathematics",
            Self::EnvironmentalScience => "environmental_science",
            Self::ClimateScience => "climate_science",
            Self::General => "general",
        }
    }

    /// Interpret a one-word classifier reply. Unknown words map to `General`.
    pub fn from_response(text: &str) -> Self {
        let word = text
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase()
            .replace(' ', "_");
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == word)
            .unwrap_or_default()
    }

    /// Prompt framing for this domain.
    ///
    /// Domains without a dedicated template share the general one.
    pub fn context(&self) -> DomainContext {
        match self {
            Self::Physics => DomainContext {
                field: "physics research",
                expert_role: "physics researcher",
                core_entities: "Physical systems, theoretical frameworks, experimental parameters, physical constants",
                search_focus: "theoretical physics, experimental physics, computational physics",
                enhancement_terms: ["physics", "theoretical physics", "experimental physics"],
                hypothesis_elements: [
                    "Theoretical Model/Approach",
                    "Physical System/Phenomenon",
                    "Underlying Mechanism/Theory",
                    "Scientific Rationale",
                    "Experimental/Computational Validation",
                ],
                structure_description: "physics hypothesis",
            },
            Self::Chemistry => DomainContext {
                field: "chemistry research",
                expert_role: "chemistry researcher",
                core_entities: "Chemical compounds, reaction mechanisms, synthetic methods, catalysts",
                search_focus: "chemical synthesis, reaction mechanisms, catalysis",
                enhancement_terms: ["chemistry", "chemical synthesis", "reaction mechanisms"],
                hypothesis_elements: [
                    "Chemical Method/Synthesis",
                    "Target Compound/System",
                    "Reaction Mechanism/Theory",
                    "Chemical Rationale",
                    "Experimental Validation/Analysis",
                ],
                structure_description: "chemistry hypothesis",
            },
            Self::ComputerScience => DomainContext {
                field: "computer science research",
                expert_role: "computer science researcher",
                core_entities: "Algorithms, data structures, computational methods, systems architecture",
                search_focus: "computational methods, algorithms, systems research",
                enhancement_terms: ["computer science", "algorithms", "computational methods"],
                hypothesis_elements: [
                    "Algorithm/Method",
                    "Problem/Application",
                    "Computational Theory/Framework",
                    "Technical Rationale",
                    "Implementation/Evaluation",
                ],
                structure_description: "computer science hypothesis",
            },
            Self::Biology => DomainContext {
                field: "biological research",
                expert_role: "biological researcher",
                core_entities: "Biological systems, molecular mechanisms, cellular processes, organisms",
                search_focus: "molecular biology, cellular biology, systems biology",
                enhancement_terms: ["biology", "molecular biology", "biological systems"],
                hypothesis_elements: [
                    "Biological Method/Approach",
                    "Target System/Organism",
                    "Molecular/Cellular Mechanism",
                    "Biological Rationale",
                    "Experimental Design/Validation",
                ],
                structure_description: "biological hypothesis",
            },
            Self::EnvironmentalScience => DomainContext {
                field: "environmental science research",
                expert_role: "environmental science researcher",
                core_entities: "Environmental systems, ecological processes, pollution sources, sustainability measures",
                search_focus: "environmental impact, sustainability, ecological systems",
                enhancement_terms: ["environmental science", "sustainability", "ecological systems"],
                hypothesis_elements: [
                    "Environmental Approach/Method",
                    "Target System/Issue",
                    "Environmental Mechanism/Process",
                    "Environmental Rationale",
                    "Field Study/Measurement Design",
                ],
                structure_description: "environmental science hypothesis",
            },
            Self::ClimateScience => DomainContext {
                field: "climate science research",
                expert_role: "climate science researcher",
                core_entities: "Climate systems, atmospheric processes, greenhouse gases, climate patterns",
                search_focus: "climate change, atmospheric science, climate modeling",
                enhancement_terms: ["climate science", "climate change", "atmospheric science"],
                hypothesis_elements: [
                    "Climate Method/Model",
                    "Target Climate System/Process",
                    "Climate Mechanism/Theory",
                    "Climate Rationale",
                    "Climate Analysis/Modeling Design",
                ],
                structure_description: "climate science hypothesis",
            },
            _ => DomainContext::general(),
        }
    }
}

impl std::fmt::Display for ResearchDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expert framing used to steer search and synthesis prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainContext {
    pub field: &'static str,
    pub expert_role: &'static str,
    pub core_entities: &'static str,
    pub search_focus: &'static str,
    pub enhancement_terms: [&'static str; 3],
    pub hypothesis_elements: [&'static str; 5],
    pub structure_description: &'static str,
}

impl DomainContext {
    /// Template for general scientific research.
    pub fn general() -> Self {
        Self {
            field: "general scientific research",
            expert_role: "scientific researcher",
            core_entities: "Research methods, theoretical frameworks, experimental approaches, analytical tools",
            search_focus: "scientific methodology, research approaches, systematic investigation",
            enhancement_terms: [
                "scientific research",
                "research methodology",
                "systematic investigation",
            ],
            hypothesis_elements: [
                "Research Method/Approach",
                "Target Problem/Question",
                "Theoretical Framework/Mechanism",
                "Scientific Rationale",
                "Investigation/Validation Design",
            ],
            structure_description: "research hypothesis",
        }
    }
}

impl Default for DomainContext {
    fn default() -> Self {
        Self::general()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_tolerates_noise() {
        assert_eq!(ResearchDomain::from_response("  Physics.\n"), ResearchDomain::Physics);
        assert_eq!(
            ResearchDomain::from_response("computer_science"),
            ResearchDomain::ComputerScience
        );
        assert_eq!(ResearchDomain::from_response("astrology"), ResearchDomain::General);
        assert_eq!(ResearchDomain::from_response(""), ResearchDomain::General);
    }

    #[test]
    fn test_domains_without_template_use_general() {
        assert_eq!(ResearchDomain::Medicine.context(), DomainContext::general());
        assert_eq!(ResearchDomain::Mathematics.context(), DomainContext::general());
        assert_ne!(ResearchDomain::Biology.context(), DomainContext::general());
    }

    #[test]
    fn test_every_domain_round_trips_its_name() {
        for domain in ResearchDomain::ALL {
            assert_eq!(ResearchDomain::from_response(domain.as_str()), domain);
        }
    }
}
