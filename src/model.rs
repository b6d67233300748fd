use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

pub const PERIODS: [&str; 4] = ["FA1", "FA2", "FA3", "FA4"];
pub const TOOL_MAX: [f64; 4] = [10.0, 10.0, 10.0, 20.0];
pub const FA_TOTAL_MAX: f64 = 200.0;
pub const DEFAULT_SA_MAX_MARKS: f64 = 80.0;
pub const DEFAULT_CO_CURRICULAR_MAX_MARKS: f64 = 50.0;
pub const CO_CURRICULAR_SUB_ASSESSMENTS: usize = 3;
pub const MAX_WORKING_DAYS: u32 = 31;

pub const DEFAULT_TEMPLATE_KEY: &str = "cbse-state";
pub const DEFAULT_TERM: &str = "annual";

/// Academic months, June through April.
pub const ATTENDANCE_MONTHS: [&str; 11] = [
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
    "January",
    "February",
    "March",
    "April",
];

pub const DEFAULT_CO_CURRICULAR_AREAS: [&str; 4] = [
    "Value Education & Life Skills",
    "Art & Cultural Education",
    "Work & Computer Education",
    "Physical & Health Education",
];

/// Subjects whose papers are not the generic "I".
const PAPER_LAYOUT: [(&str, &[&str]); 2] = [
    ("Science", &["Physics", "Biology"]),
    ("English", &["I", "II"]),
];

const SINGLE_PAPER: &[&str] = &["I"];

pub const SCIENCE: &str = "Science";
pub const SCIENCE_PAPERS: [&str; 2] = ["Physics", "Biology"];

pub fn subject_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn is_paper_of_listed(subject: &str, subjects: &[String]) -> bool {
    subjects.iter().any(|other| {
        !subject_eq(other, subject)
            && papers_for_subject(other)
                .iter()
                .any(|p| subject_eq(p, subject))
    })
}

pub fn papers_for_subject(subject: &str) -> &'static [&'static str] {
    PAPER_LAYOUT
        .iter()
        .find(|(name, _)| subject_eq(name, subject))
        .map(|(_, papers)| *papers)
        .unwrap_or(SINGLE_PAPER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Who is acting on a report. Passed explicitly into every policy and
/// lifecycle call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub role: Role,
    pub user_id: String,
    #[serde(default)]
    pub assigned_subjects: Vec<String>,
}

impl Actor {
    #[cfg(test)]
    pub fn new(role: Role, user_id: &str, assigned_subjects: &[&str]) -> Self {
        Self {
            role,
            user_id: user_id.to_string(),
            assigned_subjects: assigned_subjects.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportKey {
    pub student_id: String,
    pub school_id: String,
    pub academic_year: String,
    pub template_key: String,
    pub term: String,
}

impl ReportKey {
    #[cfg(test)]
    pub fn annual(student_id: &str, school_id: &str, academic_year: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            school_id: school_id.to_string(),
            academic_year: academic_year.to_string(),
            template_key: DEFAULT_TEMPLATE_KEY.to_string(),
            term: DEFAULT_TERM.to_string(),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (field, value) in [
            ("studentId", &self.student_id),
            ("schoolId", &self.school_id),
            ("templateKey", &self.template_key),
            ("term", &self.term),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::validation(field, "must not be empty"));
            }
        }
        validate_academic_year(&self.academic_year)
    }
}

/// `YYYY-YYYY` where the second year follows the first.
pub fn validate_academic_year(year: &str) -> EngineResult<()> {
    let bad = || EngineError::validation("academicYear", "must be YYYY-YYYY with consecutive years");
    let (start, end) = year.trim().split_once('-').ok_or_else(bad)?;
    if start.len() != 4 || end.len() != 4 {
        return Err(bad());
    }
    let start: i32 = start.parse().map_err(|_| bad())?;
    let end: i32 = end.parse().map_err(|_| bad())?;
    if end != start + 1 {
        return Err(bad());
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub name: String,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub class_name: String,
    pub section: Option<String>,
    pub roll_no: Option<String>,
    pub admission_no: Option<String>,
    pub exam_no: Option<String>,
    pub date_of_birth: Option<String>,
    pub medium: Option<String>,
    pub captured_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolScores {
    pub tool1: Option<f64>,
    pub tool2: Option<f64>,
    pub tool3: Option<f64>,
    pub tool4: Option<f64>,
}

impl ToolScores {
    #[cfg(test)]
    pub fn new(tool1: f64, tool2: f64, tool3: f64, tool4: f64) -> Self {
        Self {
            tool1: Some(tool1),
            tool2: Some(tool2),
            tool3: Some(tool3),
            tool4: Some(tool4),
        }
    }

    pub fn as_array(&self) -> [Option<f64>; 4] {
        [self.tool1, self.tool2, self.tool3, self.tool4]
    }

    pub fn set(&mut self, tool_idx: usize, value: Option<f64>) {
        match tool_idx {
            0 => self.tool1 = value,
            1 => self.tool2 = value,
            2 => self.tool3 = value,
            _ => self.tool4 = value,
        }
    }

    fn validate(&self, field: &str) -> EngineResult<()> {
        for (i, value) in self.as_array().iter().enumerate() {
            if let Some(v) = value {
                check_range(&format!("{}.tool{}", field, i + 1), *v, TOOL_MAX[i])?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormativePeriods {
    pub fa1: ToolScores,
    pub fa2: ToolScores,
    pub fa3: ToolScores,
    pub fa4: ToolScores,
}

impl FormativePeriods {
    pub fn as_array(&self) -> [&ToolScores; 4] {
        [&self.fa1, &self.fa2, &self.fa3, &self.fa4]
    }

    pub fn period_mut(&mut self, idx: usize) -> &mut ToolScores {
        match idx {
            0 => &mut self.fa1,
            1 => &mut self.fa2,
            2 => &mut self.fa3,
            _ => &mut self.fa4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormativeSubjectRecord {
    pub subject: String,
    #[serde(default)]
    pub periods: FormativePeriods,
}

impl FormativeSubjectRecord {
    pub fn empty(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            periods: FormativePeriods::default(),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        require_name("formative.subject", &self.subject)?;
        for (i, period) in self.periods.as_array().iter().enumerate() {
            period.validate(&format!("formative[{}].{}", self.subject, PERIODS[i]))?;
        }
        Ok(())
    }
}

/// A score out of a configurable maximum (summative papers, co-curricular
/// sub-assessments).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksEntry {
    pub marks: Option<f64>,
    pub max_marks: f64,
}

impl MarksEntry {
    pub fn empty(max_marks: f64) -> Self {
        Self {
            marks: None,
            max_marks,
        }
    }

    pub fn scored(marks: f64, max_marks: f64) -> Self {
        Self {
            marks: Some(marks),
            max_marks,
        }
    }

    pub fn percentage(&self) -> Option<f64> {
        let marks = self.marks?;
        if self.max_marks > 0.0 {
            Some(marks / self.max_marks * 100.0)
        } else {
            None
        }
    }

    fn validate(&self, field: &str) -> EngineResult<()> {
        if !self.max_marks.is_finite() || self.max_marks <= 0.0 {
            return Err(EngineError::validation(
                format!("{}.maxMarks", field),
                "must be greater than 0",
            ));
        }
        if let Some(m) = self.marks {
            check_range(&format!("{}.marks", field), m, self.max_marks)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummativeSubjectPaperEntry {
    pub subject: String,
    pub paper: String,
    pub sa1: MarksEntry,
    pub sa2: MarksEntry,
    #[serde(rename = "faTotal200M", default)]
    pub fa_total_200m: Option<f64>,
}

impl SummativeSubjectPaperEntry {
    pub fn empty(subject: &str, paper: &str) -> Self {
        Self {
            subject: subject.to_string(),
            paper: paper.to_string(),
            sa1: MarksEntry::empty(DEFAULT_SA_MAX_MARKS),
            sa2: MarksEntry::empty(DEFAULT_SA_MAX_MARKS),
            fa_total_200m: None,
        }
    }

    pub fn same_row(&self, subject: &str, paper: &str) -> bool {
        subject_eq(&self.subject, subject) && subject_eq(&self.paper, paper)
    }

    pub fn has_data(&self) -> bool {
        self.sa1.marks.is_some() || self.sa2.marks.is_some() || self.fa_total_200m.is_some()
    }

    pub fn validate(&self) -> EngineResult<()> {
        require_name("summative.subject", &self.subject)?;
        let field = format!("summative[{}/{}]", self.subject, self.paper);
        if !papers_for_subject(&self.subject)
            .iter()
            .any(|p| subject_eq(p, &self.paper))
        {
            return Err(EngineError::validation(
                format!("{}.paper", field),
                format!(
                    "{} has papers {}",
                    self.subject,
                    papers_for_subject(&self.subject).join(", ")
                ),
            ));
        }
        self.sa1.validate(&format!("{}.sa1", field))?;
        self.sa2.validate(&format!("{}.sa2", field))?;
        if let Some(fa) = self.fa_total_200m {
            check_range(&format!("{}.faTotal200M", field), fa, FA_TOTAL_MAX)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMonthEntry {
    pub month: String,
    pub working_days: u32,
    pub present_days: u32,
}

impl AttendanceMonthEntry {
    pub fn has_data(&self) -> bool {
        self.working_days > 0 || self.present_days > 0
    }

    pub fn validate(&self) -> EngineResult<()> {
        let field = format!("attendance[{}]", self.month);
        if month_index(&self.month).is_none() {
            return Err(EngineError::validation(
                field,
                "month must be one of June..April",
            ));
        }
        if self.working_days > MAX_WORKING_DAYS {
            return Err(EngineError::validation(
                format!("{}.workingDays", field),
                format!("must be at most {}", MAX_WORKING_DAYS),
            ));
        }
        if self.present_days > self.working_days {
            return Err(EngineError::validation(
                format!("{}.presentDays", field),
                "must not exceed workingDays",
            ));
        }
        Ok(())
    }
}

pub fn month_index(month: &str) -> Option<usize> {
    ATTENDANCE_MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month.trim()))
}

pub fn blank_attendance() -> Vec<AttendanceMonthEntry> {
    ATTENDANCE_MONTHS
        .iter()
        .map(|m| AttendanceMonthEntry {
            month: m.to_string(),
            working_days: 0,
            present_days: 0,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoCurricularRecord {
    pub area: String,
    pub assessments: Vec<MarksEntry>,
}

impl CoCurricularRecord {
    pub fn empty(area: &str) -> Self {
        Self {
            area: area.to_string(),
            assessments: vec![
                MarksEntry::empty(DEFAULT_CO_CURRICULAR_MAX_MARKS);
                CO_CURRICULAR_SUB_ASSESSMENTS
            ],
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        require_name("coCurricular.area", &self.area)?;
        let field = format!("coCurricular[{}]", self.area);
        if self.assessments.len() != CO_CURRICULAR_SUB_ASSESSMENTS {
            return Err(EngineError::validation(
                format!("{}.assessments", field),
                format!("expected {} sub-assessments", CO_CURRICULAR_SUB_ASSESSMENTS),
            ));
        }
        for (i, a) in self.assessments.iter().enumerate() {
            a.validate(&format!("{}.assessments[{}]", field, i))?;
        }
        Ok(())
    }
}

/// The raw, persisted part of a report record. Everything derived is
/// recomputed from this by `calc::derive_report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDoc {
    pub student: StudentInfo,
    pub class_id: String,
    pub second_language: Option<String>,
    pub formative: Vec<FormativeSubjectRecord>,
    pub summative: Vec<SummativeSubjectPaperEntry>,
    pub attendance: Vec<AttendanceMonthEntry>,
    #[serde(default)]
    pub co_curricular: Vec<CoCurricularRecord>,
    #[serde(default)]
    pub overall_grade_override: Option<String>,
}

impl ReportDoc {
    /// An empty document with one formative record per subject and one
    /// summative row per subject paper. Class subjects that name a paper of
    /// another listed subject (Physics, Biology under Science) only carry a
    /// teacher assignment and get no record of their own.
    pub fn blank(
        student: StudentInfo,
        class_id: &str,
        subjects: &[String],
        second_language: Option<String>,
    ) -> Self {
        let subjects: Vec<&String> = subjects
            .iter()
            .filter(|s| !is_paper_of_listed(s, subjects))
            .collect();
        let formative = subjects
            .iter()
            .map(|s| FormativeSubjectRecord::empty(s))
            .collect();
        let summative = subjects
            .iter()
            .flat_map(|s| {
                papers_for_subject(s)
                    .iter()
                    .map(move |p| SummativeSubjectPaperEntry::empty(s, p))
            })
            .collect();
        Self {
            student,
            class_id: class_id.to_string(),
            second_language,
            formative,
            summative,
            attendance: blank_attendance(),
            co_curricular: DEFAULT_CO_CURRICULAR_AREAS
                .iter()
                .map(|a| CoCurricularRecord::empty(a))
                .collect(),
            overall_grade_override: None,
        }
    }

    /// Once any summative or attendance data exists the admin edit lock
    /// engages.
    pub fn has_summative_or_attendance_data(&self) -> bool {
        self.summative.iter().any(|e| e.has_data())
            || self.attendance.iter().any(|m| m.has_data())
    }

    pub fn is_second_language(&self, subject: &str) -> bool {
        self.second_language
            .as_deref()
            .map(|sl| subject_eq(sl, subject))
            .unwrap_or(false)
    }

    pub fn formative_mut(&mut self, subject: &str) -> Option<&mut FormativeSubjectRecord> {
        self.formative
            .iter_mut()
            .find(|f| subject_eq(&f.subject, subject))
    }

    pub fn summative_mut(
        &mut self,
        subject: &str,
        paper: &str,
    ) -> Option<&mut SummativeSubjectPaperEntry> {
        self.summative.iter_mut().find(|e| e.same_row(subject, paper))
    }
}

/// Upstream marks-store natural key: `FA1-Tool3`, `SA2-Paper1`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentName {
    Formative { period: usize, tool: usize },
    Summative { exam: usize, paper: usize },
}

impl FromStr for AssessmentName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || {
            EngineError::validation(
                "assessmentName",
                "expected FA1..FA4-Tool1..Tool4 or SA1..SA2-Paper1..Paper2",
            )
        };
        let (head, tail) = s.trim().split_once('-').ok_or_else(bad)?;
        let head = head.to_ascii_uppercase();
        let tail = tail.to_ascii_lowercase();
        let index = |prefix: &str, value: &str, max: usize| -> Option<usize> {
            let n: usize = value.strip_prefix(prefix)?.parse().ok()?;
            (1..=max).contains(&n).then_some(n - 1)
        };
        if let Some(period) = index("FA", &head, 4) {
            let tool = index("tool", &tail, 4).ok_or_else(bad)?;
            return Ok(AssessmentName::Formative { period, tool });
        }
        if let Some(exam) = index("SA", &head, 2) {
            let paper = index("paper", &tail, 2).ok_or_else(bad)?;
            return Ok(AssessmentName::Summative { exam, paper });
        }
        Err(bad())
    }
}

impl fmt::Display for AssessmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentName::Formative { period, tool } => {
                write!(f, "FA{}-Tool{}", period + 1, tool + 1)
            }
            AssessmentName::Summative { exam, paper } => {
                write!(f, "SA{}-Paper{}", exam + 1, paper + 1)
            }
        }
    }
}

fn require_name(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn check_range(field: &str, value: f64, max: f64) -> EngineResult<()> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(EngineError::validation(
            field,
            format!("must be between 0 and {}", max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessment_names_parse_and_print() {
        let fa: AssessmentName = "FA3-Tool4".parse().expect("fa name");
        assert_eq!(fa, AssessmentName::Formative { period: 2, tool: 3 });
        assert_eq!(fa.to_string(), "FA3-Tool4");

        let sa: AssessmentName = "sa2-paper1".parse().expect("sa name");
        assert_eq!(sa, AssessmentName::Summative { exam: 1, paper: 0 });
        assert_eq!(sa.to_string(), "SA2-Paper1");

        assert!("FA5-Tool1".parse::<AssessmentName>().is_err());
        assert!("SA1-Tool1".parse::<AssessmentName>().is_err());
        assert!("Quiz".parse::<AssessmentName>().is_err());
    }

    #[test]
    fn paper_layout_is_explicit() {
        assert_eq!(papers_for_subject("science"), &["Physics", "Biology"]);
        assert_eq!(papers_for_subject("English"), &["I", "II"]);
        assert_eq!(papers_for_subject("Hindi"), &["I"]);
    }

    #[test]
    fn academic_year_must_be_consecutive() {
        assert!(validate_academic_year("2024-2025").is_ok());
        assert!(validate_academic_year("2024-2026").is_err());
        assert!(validate_academic_year("24-25").is_err());
        assert!(validate_academic_year("").is_err());
    }

    #[test]
    fn tool_scores_outside_bounds_are_rejected() {
        let mut record = FormativeSubjectRecord::empty("Maths");
        record.periods.fa2 = ToolScores::new(10.0, 10.0, 10.0, 21.0);
        match record.validate() {
            Err(EngineError::Validation { field, .. }) => {
                assert_eq!(field, "formative[Maths].FA2.tool4")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn summative_marks_must_fit_max_marks() {
        let mut entry = SummativeSubjectPaperEntry::empty("Science", "Physics");
        entry.sa1 = MarksEntry::scored(81.0, 80.0);
        assert!(entry.validate().is_err());
        entry.sa1 = MarksEntry::scored(40.0, 80.0);
        entry.fa_total_200m = Some(201.0);
        assert!(entry.validate().is_err());
        entry.fa_total_200m = Some(200.0);
        assert!(entry.validate().is_ok());

        let wrong_paper = SummativeSubjectPaperEntry::empty("Science", "II");
        assert!(wrong_paper.validate().is_err());
    }

    #[test]
    fn attendance_present_cannot_exceed_working() {
        let entry = AttendanceMonthEntry {
            month: "June".to_string(),
            working_days: 20,
            present_days: 21,
        };
        assert!(entry.validate().is_err());
        let unknown = AttendanceMonthEntry {
            month: "May".to_string(),
            working_days: 0,
            present_days: 0,
        };
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn blank_doc_has_rows_for_every_paper() {
        let subjects = vec!["English".to_string(), "Science".to_string(), "Hindi".to_string()];
        let doc = ReportDoc::blank(StudentInfo::default(), "c1", &subjects, Some("Hindi".into()));
        assert_eq!(doc.formative.len(), 3);
        assert_eq!(doc.summative.len(), 5);
        assert_eq!(doc.attendance.len(), 11);
        assert!(!doc.has_summative_or_attendance_data());
        assert!(doc.is_second_language("hindi"));
    }

    #[test]
    fn paper_assignments_do_not_become_subjects() {
        let subjects: Vec<String> = ["Maths", "Physics", "Biology", "Science"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let doc = ReportDoc::blank(StudentInfo::default(), "c1", &subjects, None);
        let names: Vec<&str> = doc.formative.iter().map(|f| f.subject.as_str()).collect();
        assert_eq!(names, vec!["Maths", "Science"]);
        assert_eq!(doc.summative.len(), 3);

        // Without Science listed, Physics is an ordinary single-paper subject.
        let alone = vec!["Physics".to_string()];
        let doc = ReportDoc::blank(StudentInfo::default(), "c1", &alone, None);
        assert_eq!(doc.formative.len(), 1);
        assert_eq!(doc.summative[0].paper, "I");
    }
}
