//! Field mutability for report records. This is the single place that decides
//! whether an actor may change a field; the save path and the view builder
//! both go through it.

use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::model::{subject_eq, Actor, ReportDoc, Role, SCIENCE, SCIENCE_PAPERS};

/// `has_data` is the admin lock: once a record carries summative or
/// attendance data, admin edits are refused.
pub fn can_edit(role: Role, subject_name: &str, assigned_subjects: &[String], has_data: bool) -> bool {
    match role {
        Role::Student => false,
        Role::Teacher => teacher_covers(subject_name, assigned_subjects),
        Role::Admin => !has_data,
    }
}

/// Physics and Biology teachers share the Science aggregate fields.
fn teacher_covers(subject_name: &str, assigned_subjects: &[String]) -> bool {
    if assigned_subjects.iter().any(|a| subject_eq(a, subject_name)) {
        return true;
    }
    subject_eq(subject_name, SCIENCE)
        && assigned_subjects
            .iter()
            .any(|a| SCIENCE_PAPERS.iter().any(|p| subject_eq(a, p)))
}

/// Overall grade and second-language designation: admins only, and only
/// before downstream data exists.
pub fn can_edit_overall_grade(role: Role, has_data: bool) -> bool {
    role == Role::Admin && !has_data
}

/// Attendance and co-curricular areas belong to whoever teaches the class.
pub fn can_edit_class_wide(role: Role, assigned_subjects: &[String], has_data: bool) -> bool {
    match role {
        Role::Student => false,
        Role::Teacher => assigned_subjects.iter().any(|s| !s.trim().is_empty()),
        Role::Admin => !has_data,
    }
}

/// SA marks of a Science row belong to the paper's teacher (Physics or
/// Biology) or to a teacher assigned Science itself.
pub fn can_edit_paper_marks(
    role: Role,
    subject: &str,
    paper: &str,
    assigned_subjects: &[String],
    has_data: bool,
) -> bool {
    if role == Role::Teacher && subject_eq(subject, SCIENCE) {
        return assigned_subjects
            .iter()
            .any(|a| subject_eq(a, paper) || subject_eq(a, SCIENCE));
    }
    can_edit(role, subject, assigned_subjects, has_data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Formative { subject: &'a str },
    PaperMarks { subject: &'a str, paper: &'a str },
    FaTotal { subject: &'a str },
    Attendance,
    CoCurricular { area: &'a str },
    OverallGrade,
    SecondLanguage,
}

impl Field<'_> {
    fn subject_label(&self) -> String {
        match self {
            Field::Formative { subject } | Field::FaTotal { subject } => subject.to_string(),
            Field::PaperMarks { subject, paper } => format!("{}/{}", subject, paper),
            Field::CoCurricular { area } => area.to_string(),
            Field::Attendance | Field::OverallGrade | Field::SecondLanguage => "record".to_string(),
        }
    }

    fn field_label(&self) -> &'static str {
        match self {
            Field::Formative { .. } => "formative",
            Field::PaperMarks { .. } => "summativeMarks",
            Field::FaTotal { .. } => "faTotal200M",
            Field::Attendance => "attendance",
            Field::CoCurricular { .. } => "coCurricular",
            Field::OverallGrade => "overallGrade",
            Field::SecondLanguage => "secondLanguage",
        }
    }
}

pub fn allows(actor: &Actor, field: Field<'_>, has_data: bool) -> bool {
    let assigned = &actor.assigned_subjects;
    match field {
        Field::Formative { subject } | Field::FaTotal { subject } => {
            can_edit(actor.role, subject, assigned, has_data)
        }
        Field::PaperMarks { subject, paper } => {
            can_edit_paper_marks(actor.role, subject, paper, assigned, has_data)
        }
        Field::Attendance | Field::CoCurricular { .. } => {
            can_edit_class_wide(actor.role, assigned, has_data)
        }
        Field::OverallGrade | Field::SecondLanguage => can_edit_overall_grade(actor.role, has_data),
    }
}

pub fn ensure(actor: &Actor, field: Field<'_>, has_data: bool) -> EngineResult<()> {
    if allows(actor, field, has_data) {
        return Ok(());
    }
    Err(EngineError::Conflict {
        role: actor.role,
        user_id: actor.user_id.clone(),
        subject: field.subject_label(),
        field: field.field_label().to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectEditability {
    pub subject: String,
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperEditability {
    pub subject: String,
    pub paper: String,
    pub marks: bool,
    #[serde(rename = "faTotal200M")]
    pub fa_total_200m: bool,
}

/// What the renderer should unlock for this actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditabilityMap {
    pub role: Role,
    pub admin_locked: bool,
    pub formative: Vec<SubjectEditability>,
    pub summative: Vec<PaperEditability>,
    pub attendance: bool,
    pub co_curricular: bool,
    pub overall_grade: bool,
    pub second_language: bool,
}

pub fn editability(actor: &Actor, doc: &ReportDoc, has_data: bool) -> EditabilityMap {
    EditabilityMap {
        role: actor.role,
        admin_locked: has_data,
        formative: doc
            .formative
            .iter()
            .map(|f| SubjectEditability {
                subject: f.subject.clone(),
                editable: allows(actor, Field::Formative { subject: &f.subject }, has_data),
            })
            .collect(),
        summative: doc
            .summative
            .iter()
            .map(|e| PaperEditability {
                subject: e.subject.clone(),
                paper: e.paper.clone(),
                marks: allows(
                    actor,
                    Field::PaperMarks {
                        subject: &e.subject,
                        paper: &e.paper,
                    },
                    has_data,
                ),
                fa_total_200m: allows(actor, Field::FaTotal { subject: &e.subject }, has_data),
            })
            .collect(),
        attendance: allows(actor, Field::Attendance, has_data),
        co_curricular: allows(actor, Field::CoCurricular { area: "" }, has_data),
        overall_grade: allows(actor, Field::OverallGrade, has_data),
        second_language: allows(actor, Field::SecondLanguage, has_data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentInfo;

    const SUBJECTS: [&str; 8] = [
        "Telugu", "Hindi", "English", "Maths", "Science", "Physics", "Biology", "Social",
    ];

    fn assigned(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn maths_teacher_matrix_is_exhaustive() {
        let maths_only = assigned(&["Maths"]);
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            for subject in SUBJECTS {
                for has_data in [false, true] {
                    let got = can_edit(role, subject, &maths_only, has_data);
                    let expected = match role {
                        Role::Student => false,
                        Role::Teacher => subject == "Maths",
                        Role::Admin => !has_data,
                    };
                    assert_eq!(got, expected, "{:?} {} data={}", role, subject, has_data);
                }
            }
        }
        assert!(!can_edit(Role::Teacher, "English", &maths_only, false));
        assert!(can_edit(Role::Teacher, "maths ", &maths_only, true));
    }

    #[test]
    fn physics_and_biology_teachers_share_science_aggregate() {
        for paper in SCIENCE_PAPERS {
            let list = assigned(&[paper]);
            assert!(can_edit(Role::Teacher, "Science", &list, true));
            assert!(can_edit_paper_marks(Role::Teacher, "Science", paper, &list, true));
        }
        let physics = assigned(&["Physics"]);
        assert!(!can_edit_paper_marks(Role::Teacher, "Science", "Biology", &physics, false));

        let science = assigned(&["Science"]);
        assert!(can_edit_paper_marks(Role::Teacher, "Science", "Physics", &science, false));
        assert!(can_edit_paper_marks(Role::Teacher, "Science", "Biology", &science, false));
        // The aggregate rule does not run the other way for other subjects.
        assert!(!can_edit(Role::Teacher, "Physics", &assigned(&["Maths"]), false));
    }

    #[test]
    fn admin_is_locked_once_data_exists() {
        let none: Vec<String> = Vec::new();
        assert!(can_edit(Role::Admin, "English", &none, false));
        assert!(!can_edit(Role::Admin, "English", &none, true));
        assert!(can_edit_overall_grade(Role::Admin, false));
        assert!(!can_edit_overall_grade(Role::Admin, true));
    }

    #[test]
    fn overall_grade_is_admin_only() {
        assert!(!can_edit_overall_grade(Role::Teacher, false));
        assert!(!can_edit_overall_grade(Role::Student, false));
    }

    #[test]
    fn class_wide_fields_need_an_assignment() {
        assert!(can_edit_class_wide(Role::Teacher, &assigned(&["Hindi"]), true));
        assert!(!can_edit_class_wide(Role::Teacher, &[], false));
        assert!(!can_edit_class_wide(Role::Student, &assigned(&["Hindi"]), false));
    }

    #[test]
    fn ensure_reports_actor_context() {
        let actor = Actor::new(Role::Teacher, "t-1", &["Maths"]);
        let e = ensure(&actor, Field::Formative { subject: "English" }, false)
            .expect_err("english is not assigned");
        match e {
            EngineError::Conflict {
                role,
                user_id,
                subject,
                field,
            } => {
                assert_eq!(role, Role::Teacher);
                assert_eq!(user_id, "t-1");
                assert_eq!(subject, "English");
                assert_eq!(field, "formative");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn editability_map_follows_assignments() {
        let subjects = assigned(&["English", "Maths", "Science"]);
        let doc = ReportDoc::blank(StudentInfo::default(), "c", &subjects, None);
        let actor = Actor::new(Role::Teacher, "t-2", &["Biology"]);
        let map = editability(&actor, &doc, false);

        let formative: Vec<(&str, bool)> = map
            .formative
            .iter()
            .map(|f| (f.subject.as_str(), f.editable))
            .collect();
        assert_eq!(
            formative,
            vec![("English", false), ("Maths", false), ("Science", true)]
        );
        let bio = map
            .summative
            .iter()
            .find(|p| p.paper == "Biology")
            .expect("biology row");
        assert!(bio.marks && bio.fa_total_200m);
        let phy = map
            .summative
            .iter()
            .find(|p| p.paper == "Physics")
            .expect("physics row");
        assert!(!phy.marks && phy.fa_total_200m);
        assert!(map.attendance);
        assert!(!map.overall_grade);
    }
}
