//! Department and emergency contact data

use serde::{Deserialize, Serialize};

/// Out-of-hours line for a department
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgentContact {
    pub phone: String,
    /// When the line is staffed / what it is for
    pub available: String,
}

/// A university department students can be referred to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    /// Stable lookup key (e.g. `accommodation`)
    pub key: String,
    /// Display name (e.g. `Accommodation Office`)
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgent_contact: Option<UrgentContact>,
    /// Taxonomy categories this department handles
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Always-available contact for emergencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub description: String,
}

struct DepartmentSeed {
    key: &'static str,
    name: &'static str,
    local_part: &'static str,
    phone: &'static str,
    location: &'static str,
    hours: &'static str,
    path: &'static str,
    description: &'static str,
    urgent: Option<(&'static str, &'static str)>,
    categories: &'static [&'static str],
}

const WEEKDAYS: &str = "Monday-Friday: 9:00am - 5:00pm";
const WEEKDAYS_EARLY: &str = "Monday-Friday: 9:00am - 4:30pm";

const DEPARTMENTS: &[DepartmentSeed] = &[
    DepartmentSeed {
        key: "accommodation",
        name: "Accommodation Office",
        local_part: "accommodation",
        phone: "+44 (0)20 7946 0101",
        location: "Student Hub, Ground Floor",
        hours: WEEKDAYS,
        path: "life-on-campus/accommodation",
        description: "Help with university accommodation, room issues, contracts, and housing advice",
        urgent: None,
        categories: &["Accommodation"],
    },
    DepartmentSeed {
        key: "finance",
        name: "Finance Office",
        local_part: "finance",
        phone: "+44 (0)20 7946 0102",
        location: "Student Hub, First Floor",
        hours: WEEKDAYS_EARLY,
        path: "study/finance",
        description: "Tuition fees, payments, refunds, and financial queries",
        urgent: Some(("+44 (0)20 7946 0103", "Emergencies only")),
        categories: &["Fees & Finance"],
    },
    DepartmentSeed {
        key: "academic_support",
        name: "Academic Support Team",
        local_part: "academicsupport",
        phone: "+44 (0)20 7946 0104",
        location: "Library, Level 2",
        hours: WEEKDAYS,
        path: "study/student-support",
        description: "Academic writing, study skills, learning support, and academic concerns",
        urgent: None,
        categories: &["Academic Support"],
    },
    DepartmentSeed {
        key: "international",
        name: "International Student Support",
        local_part: "international",
        phone: "+44 (0)20 7946 0105",
        location: "Student Hub, Ground Floor",
        hours: WEEKDAYS,
        path: "international-students",
        description: "Visa advice, immigration support, and international student services",
        urgent: Some(("+44 (0)20 7946 0106", "Visa emergencies")),
        categories: &["International Students"],
    },
    DepartmentSeed {
        key: "wellbeing",
        name: "Wellbeing Team",
        local_part: "wellbeing",
        phone: "+44 (0)20 7946 0107",
        location: "Student Hub, First Floor",
        hours: WEEKDAYS,
        path: "study/student-support/health-and-wellbeing",
        description: "Mental health support, counselling, disability support, and wellbeing services",
        urgent: Some(("116 123", "24/7 Samaritans crisis line")),
        categories: &["Health & Wellbeing"],
    },
    DepartmentSeed {
        key: "careers",
        name: "Careers Service",
        local_part: "careers",
        phone: "+44 (0)20 7946 0108",
        location: "Student Hub, First Floor",
        hours: WEEKDAYS,
        path: "study/student-support/careers",
        description: "Career advice, CV help, job applications, and employability support",
        urgent: None,
        categories: &["Careers & Employability"],
    },
    DepartmentSeed {
        key: "registry",
        name: "Registry",
        local_part: "registry",
        phone: "+44 (0)20 7946 0109",
        location: "Student Hub, Ground Floor",
        hours: WEEKDAYS_EARLY,
        path: "study/student-support",
        description: "Student ID cards, enrolment, certificates, and official documents",
        urgent: None,
        categories: &["Student ID & Registration"],
    },
    DepartmentSeed {
        key: "library",
        name: "Library Services",
        local_part: "library",
        phone: "+44 (0)20 7946 0110",
        location: "Main Library",
        hours: "24/7 (term time), Monday-Friday: 8:00am - 9:00pm (vacation)",
        path: "life-on-campus/library",
        description: "Library resources, book loans, study spaces, and research support",
        urgent: None,
        categories: &["Library"],
    },
    DepartmentSeed {
        key: "it_services",
        name: "IT Services",
        local_part: "itservices",
        phone: "+44 (0)20 7946 0111",
        location: "Student Hub or Online",
        hours: "Monday-Friday: 8:00am - 6:00pm",
        path: "study/student-support/it-services",
        description: "IT support, password resets, WiFi issues, and software help",
        urgent: None,
        categories: &["IT Services"],
    },
    DepartmentSeed {
        key: "admissions",
        name: "Admissions Office",
        local_part: "admissions",
        phone: "+44 (0)20 7946 0112",
        location: "Student Hub, Ground Floor",
        hours: WEEKDAYS,
        path: "study/how-to-apply",
        description: "Applications, offers, UCAS queries, and enrolment",
        urgent: None,
        categories: &["Admissions"],
    },
];

pub(crate) fn default_departments(email_domain: &str, website: &str) -> Vec<Department> {
    DEPARTMENTS
        .iter()
        .map(|seed| Department {
            key: seed.key.to_string(),
            name: seed.name.to_string(),
            email: format!("{}@{}", seed.local_part, email_domain),
            phone: Some(seed.phone.to_string()),
            location: Some(seed.location.to_string()),
            opening_hours: Some(seed.hours.to_string()),
            website: Some(format!("{}/{}/", website.trim_end_matches('/'), seed.path)),
            description: Some(seed.description.to_string()),
            urgent_contact: seed.urgent.map(|(phone, available)| UrgentContact {
                phone: phone.to_string(),
                available: available.to_string(),
            }),
            categories: seed.categories.iter().map(|c| c.to_string()).collect(),
        })
        .collect()
}

/// Department used when a category has no mapping
pub(crate) fn default_fallback_department(email_domain: &str) -> Department {
    Department {
        key: "student_support".to_string(),
        name: "Student Support".to_string(),
        email: format!("studentsupport@{}", email_domain),
        phone: None,
        location: None,
        opening_hours: Some(WEEKDAYS.to_string()),
        website: None,
        description: Some("General student enquiries".to_string()),
        urgent_contact: None,
        categories: Vec::new(),
    }
}

pub(crate) fn default_emergency_contacts() -> Vec<EmergencyContact> {
    [
        (
            "University Security",
            "+44 (0)20 7946 0999",
            "24/7 campus security and emergencies",
        ),
        ("Emergency Services", "999", "Police, Fire, Ambulance"),
        ("Samaritans", "116 123", "24/7 emotional support helpline"),
        (
            "NHS Non-Emergency",
            "111",
            "Medical advice when not life-threatening",
        ),
        (
            "Nightline",
            "+44 (0)20 7946 0998",
            "Student-run listening service (evenings, term time)",
        ),
    ]
    .into_iter()
    .map(|(name, phone, description)| EmergencyContact {
        name: name.to_string(),
        phone: phone.to_string(),
        description: description.to_string(),
    })
    .collect()
}
