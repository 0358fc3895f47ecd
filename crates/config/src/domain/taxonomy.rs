//! Problem taxonomy: category → subcategory → specific issues

use serde::{Deserialize, Serialize};

/// Top level of the taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyCategory {
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<TaxonomySubcategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomySubcategory {
    pub name: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl TaxonomyCategory {
    fn build(name: &str, subcategories: &[(&str, &[&str])]) -> Self {
        Self {
            name: name.to_string(),
            subcategories: subcategories
                .iter()
                .map(|(sub, issues)| TaxonomySubcategory {
                    name: sub.to_string(),
                    issues: issues.iter().map(|i| i.to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Case-insensitive subcategory lookup
    pub fn subcategory(&self, name: &str) -> Option<&TaxonomySubcategory> {
        self.subcategories
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }
}

pub(crate) fn default_taxonomy() -> Vec<TaxonomyCategory> {
    vec![
        TaxonomyCategory::build(
            "Accommodation",
            &[
                (
                    "Application & Booking",
                    &[
                        "How to apply for accommodation",
                        "Application deadline missed",
                        "Cannot access booking portal",
                        "Room preference not available",
                        "Guarantee eligibility questions",
                    ],
                ),
                (
                    "Fees & Payment",
                    &[
                        "Payment deadline confusion",
                        "Cannot pay online",
                        "Refund request",
                        "Instalment plan questions",
                        "Fee amount incorrect",
                    ],
                ),
                (
                    "Room & Facilities",
                    &[
                        "Room change request",
                        "Maintenance issue",
                        "Internet not working",
                        "Key/access card problem",
                        "Noise complaint",
                    ],
                ),
                (
                    "Contract & Moving",
                    &[
                        "Contract length questions",
                        "Early termination request",
                        "Moving in date issues",
                        "Moving out procedure",
                        "Deposit return",
                    ],
                ),
            ],
        ),
        TaxonomyCategory::build(
            "Fees & Finance",
            &[
                (
                    "Tuition Fees",
                    &[
                        "Fee amount inquiry",
                        "Payment methods",
                        "Payment deadline",
                        "Fee status check",
                        "Instalment plan setup",
                    ],
                ),
                (
                    "Scholarships & Bursaries",
                    &[
                        "Eligibility check",
                        "Application process",
                        "Application status",
                        "Award amount questions",
                        "Scholarship not applied",
                    ],
                ),
                (
                    "Student Loans",
                    &[
                        "Loan application help",
                        "Loan not received",
                        "Loan amount incorrect",
                        "Repayment questions",
                        "SFE issues",
                    ],
                ),
                (
                    "Refunds",
                    &[
                        "Tuition refund request",
                        "Refund status check",
                        "Refund amount dispute",
                        "Refund timeline",
                    ],
                ),
            ],
        ),
        TaxonomyCategory::build(
            "Academic Support",
            &[
                (
                    "Tutoring & Help",
                    &[
                        "Find academic tutor",
                        "Book tutoring session",
                        "Subject-specific help",
                        "Study skills support",
                        "Maths support help",
                    ],
                ),
                (
                    "Library Services",
                    &[
                        "Library hours",
                        "Book reservation",
                        "Online resources access",
                        "Study space booking",
                        "Library card issue",
                    ],
                ),
                (
                    "Writing Support",
                    &[
                        "Writing centre appointment booking",
                        "Essay feedback",
                        "Referencing help",
                        "Dissertation support",
                        "Academic writing tips",
                    ],
                ),
                (
                    "Exams & Assessment",
                    &[
                        "Exam timetable",
                        "Resit information",
                        "Extenuating circumstances",
                        "Grade inquiry",
                        "Assessment deadline extension",
                    ],
                ),
            ],
        ),
        TaxonomyCategory::build(
            "International Students",
            &[
                (
                    "Visa & Immigration",
                    &[
                        "Visa application help",
                        "Visa extension",
                        "CAS letter request",
                        "BRP collection",
                        "Visa status check",
                    ],
                ),
                (
                    "English Language",
                    &[
                        "Pre-sessional course info",
                        "English test requirements",
                        "Language support services",
                        "IELTS preparation",
                    ],
                ),
                (
                    "Arrival & Orientation",
                    &[
                        "Airport pickup",
                        "Orientation schedule",
                        "Registration process",
                        "Welcome week info",
                    ],
                ),
                (
                    "Working While Studying",
                    &[
                        "Work hour limits",
                        "NI number application",
                        "Part-time job search",
                        "Work rights questions",
                    ],
                ),
            ],
        ),
        TaxonomyCategory::build(
            "Health & Wellbeing",
            &[
                (
                    "Mental Health",
                    &[
                        "Counselling appointment",
                        "Crisis support needed",
                        "Anxiety/stress help",
                        "Mental health resources",
                    ],
                ),
                (
                    "Disability Support",
                    &[
                        "Register disability",
                        "Reasonable adjustments",
                        "DSA application",
                        "Accessibility issues",
                    ],
                ),
                (
                    "Medical Services",
                    &[
                        "GP registration",
                        "Medical centre hours",
                        "Vaccination info",
                        "Sick note request",
                    ],
                ),
                (
                    "General Wellbeing",
                    &[
                        "Welfare advice",
                        "Financial hardship",
                        "Homesickness support",
                        "Peer support groups",
                    ],
                ),
            ],
        ),
        TaxonomyCategory::build(
            "Careers & Employability",
            &[
                (
                    "CV & Applications",
                    &[
                        "CV review request",
                        "Cover letter help",
                        "Application advice",
                        "LinkedIn profile review",
                    ],
                ),
                (
                    "Placements",
                    &[
                        "Find placement opportunity",
                        "Placement requirements",
                        "Placement credit questions",
                        "Placement abroad",
                    ],
                ),
                (
                    "Career Guidance",
                    &[
                        "Career appointment booking",
                        "Career options exploration",
                        "Industry connections",
                        "Graduate schemes info",
                    ],
                ),
                (
                    "Skills Development",
                    &[
                        "Workshop booking",
                        "LinkedIn Learning access",
                        "Employability skills",
                        "Interview preparation",
                    ],
                ),
            ],
        ),
        TaxonomyCategory::build(
            "Student ID & Registration",
            &[
                (
                    "ID Card",
                    &[
                        "ID card not received",
                        "ID card replacement",
                        "ID card collection location",
                        "Photo upload issue",
                    ],
                ),
                (
                    "Enrolment",
                    &[
                        "Enrolment process",
                        "Enrolment deadline",
                        "Cannot complete enrolment",
                        "Document verification",
                    ],
                ),
                (
                    "Course Changes",
                    &[
                        "Change course request",
                        "Add/drop module",
                        "Intermission request",
                        "Withdrawal process",
                    ],
                ),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_taxonomy_shape() {
        let taxonomy = default_taxonomy();
        assert_eq!(taxonomy.len(), 7);
        assert!(taxonomy.iter().all(|c| !c.subcategories.is_empty()));
        assert!(taxonomy
            .iter()
            .flat_map(|c| &c.subcategories)
            .all(|s| s.issues.len() >= 4));
    }

    #[test]
    fn test_subcategory_lookup() {
        let taxonomy = default_taxonomy();
        let international = taxonomy
            .iter()
            .find(|c| c.name == "International Students")
            .unwrap();
        let visa = international.subcategory("visa & immigration").unwrap();
        assert!(visa.issues.contains(&"Visa extension".to_string()));
        assert!(international.subcategory("Parking").is_none());
    }
}
