//! Report record lifecycle: Absent -> Draft <-> Published.
//!
//! Saves are patches. Items equal to what is already stored are skipped;
//! every item that changes must pass the editability policy for the actor,
//! otherwise the whole save is refused and nothing is written.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::calc::{self, DerivedReport};
use crate::db::now_ts;
use crate::error::{EngineError, EngineResult};
use crate::grading::is_academic_grade;
use crate::model::{
    month_index, papers_for_subject, subject_eq, validate_academic_year, Actor, AttendanceMonthEntry,
    AssessmentName, CoCurricularRecord, FormativeSubjectRecord, MarksEntry, ReportDoc, ReportKey, Role,
    SummativeSubjectPaperEntry, DEFAULT_SA_MAX_MARKS, TOOL_MAX,
};
use crate::policy::{self, EditabilityMap, Field};
use crate::store::{MarksProvider, RecordedMark, ReportStore, RosterProvider, RosterStudent, StoredReport};

fn double_option<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

/// Missing keys leave a field alone. For `secondLanguage` and
/// `overallGradeOverride` an explicit `null` clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    #[serde(default)]
    pub formative: Vec<FormativeSubjectRecord>,
    #[serde(default)]
    pub summative: Vec<SummativeSubjectPaperEntry>,
    #[serde(default)]
    pub attendance: Vec<AttendanceMonthEntry>,
    #[serde(default)]
    pub co_curricular: Vec<CoCurricularRecord>,
    #[serde(default, deserialize_with = "double_option")]
    pub second_language: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub overall_grade_override: Option<Option<String>>,
}

impl SavePayload {
    pub fn validate(&self) -> EngineResult<()> {
        for f in &self.formative {
            f.validate()?;
        }
        for s in &self.summative {
            s.validate()?;
        }
        for a in &self.attendance {
            a.validate()?;
        }
        for c in &self.co_curricular {
            c.validate()?;
        }
        if let Some(Some(grade)) = &self.overall_grade_override {
            let grade = grade.trim();
            if !grade.is_empty() && !is_academic_grade(grade) {
                return Err(EngineError::validation(
                    "overallGradeOverride",
                    format!("{} is not a grade on the academic scale", grade),
                ));
            }
        }
        Ok(())
    }
}

/// Selects the records of one class for a template and term.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportScope {
    pub class_id: String,
    pub academic_year: String,
    pub template_key: String,
    pub term: String,
}

impl ReportScope {
    fn key_for(&self, student: &RosterStudent) -> ReportKey {
        ReportKey {
            student_id: student.id.clone(),
            school_id: student.school_id.clone(),
            academic_year: self.academic_year.clone(),
            template_key: self.template_key.clone(),
            term: self.term.clone(),
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if self.class_id.trim().is_empty() {
            return Err(EngineError::validation("classId", "must not be empty"));
        }
        validate_academic_year(&self.academic_year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub record_id: Option<String>,
    pub has_report: bool,
    pub is_published: bool,
    pub key: ReportKey,
    pub class_id: String,
    pub doc: ReportDoc,
    pub derived: DerivedReport,
    pub editability: EditabilityMap,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub published_at: Option<String>,
}

impl ReportView {
    fn of_record(actor: &Actor, record: StoredReport) -> Self {
        let has_data = record.doc.has_summative_or_attendance_data();
        let editability = policy::editability(actor, &record.doc, has_data);
        Self {
            record_id: Some(record.id),
            has_report: true,
            is_published: record.is_published,
            key: record.key,
            class_id: record.class_id,
            doc: record.doc,
            derived: record.derived,
            editability,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            published_at: record.published_at,
        }
    }

    fn draft(actor: &Actor, key: ReportKey, doc: ReportDoc) -> Self {
        let has_data = doc.has_summative_or_attendance_data();
        Self {
            record_id: None,
            has_report: false,
            is_published: false,
            key,
            class_id: doc.class_id.clone(),
            derived: calc::derive_report(&doc),
            editability: policy::editability(actor, &doc, has_data),
            doc,
            created_at: None,
            updated_at: None,
            published_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub created: bool,
    pub written: bool,
    pub changed_fields: usize,
    pub report: ReportView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub record_id: String,
    pub is_published: bool,
    pub changed: bool,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub student_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPublishResult {
    pub changed_count: usize,
    pub unchanged_count: usize,
    pub skipped_student_ids: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatusEntry {
    pub student_id: String,
    pub student_name: String,
    pub admission_id: Option<String>,
    pub has_report: bool,
    pub is_published: bool,
}

fn record_forbidden(actor: &Actor, field: &str) -> EngineError {
    EngineError::Conflict {
        role: actor.role,
        user_id: actor.user_id.clone(),
        subject: "record".to_string(),
        field: field.to_string(),
    }
}

fn require_admin(actor: &Actor, field: &str) -> EngineResult<()> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(record_forbidden(actor, field))
    }
}

/// Resolves the roster student behind a key and checks the key agrees with
/// the roster.
fn roster_student<R: RosterProvider>(roster: &R, key: &ReportKey) -> EngineResult<RosterStudent> {
    let student = roster
        .student(&key.student_id)?
        .ok_or_else(|| EngineError::not_found("student", &key.student_id))?;
    if student.school_id != key.school_id {
        return Err(EngineError::validation(
            "schoolId",
            "does not match the student's school",
        ));
    }
    if student.academic_year != key.academic_year {
        return Err(EngineError::validation(
            "academicYear",
            "student is not enrolled for this academic year",
        ));
    }
    Ok(student)
}

fn blank_doc<R: RosterProvider>(roster: &R, student: &RosterStudent) -> EngineResult<ReportDoc> {
    let subjects: Vec<String> = roster
        .class_subjects(&student.class_id)?
        .into_iter()
        .map(|s| s.subject_name)
        .collect();
    let second_language = roster.second_language(&student.class_id)?;
    Ok(ReportDoc::blank(
        student.snapshot(&now_ts()),
        &student.class_id,
        &subjects,
        second_language,
    ))
}

fn unknown_subject(field: &str, subject: &str) -> EngineError {
    EngineError::validation(field, format!("{} is not on this report", subject))
}

fn normalized(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Applies the differing parts of `payload` to `doc`. `has_data` is the
/// admin lock as of the persisted record. Returns how many items changed.
fn apply_patch(doc: &mut ReportDoc, payload: &SavePayload, actor: &Actor, has_data: bool) -> EngineResult<usize> {
    let mut changed = 0;
    let mut fa_totals: Vec<(String, Option<f64>)> = Vec::new();

    for incoming in &payload.formative {
        let current = doc
            .formative_mut(&incoming.subject)
            .ok_or_else(|| unknown_subject("formative.subject", &incoming.subject))?;
        if current.periods == incoming.periods {
            continue;
        }
        policy::ensure(
            actor,
            Field::Formative {
                subject: &current.subject,
            },
            has_data,
        )?;
        current.periods = incoming.periods;
        changed += 1;
    }

    for incoming in &payload.summative {
        let current = doc
            .summative_mut(&incoming.subject, &incoming.paper)
            .ok_or_else(|| {
                unknown_subject(
                    "summative.subject",
                    &format!("{}/{}", incoming.subject, incoming.paper),
                )
            })?;
        if current.sa1 != incoming.sa1 || current.sa2 != incoming.sa2 {
            policy::ensure(
                actor,
                Field::PaperMarks {
                    subject: &current.subject,
                    paper: &current.paper,
                },
                has_data,
            )?;
            current.sa1 = incoming.sa1;
            current.sa2 = incoming.sa2;
            changed += 1;
        }
        if current.fa_total_200m != incoming.fa_total_200m {
            policy::ensure(
                actor,
                Field::FaTotal {
                    subject: &current.subject,
                },
                has_data,
            )?;
            match fa_totals.iter().find(|(s, _)| subject_eq(s, &current.subject)) {
                Some((_, value)) if *value != incoming.fa_total_200m => {
                    return Err(EngineError::validation(
                        "summative.faTotal200M",
                        format!("papers of {} disagree on the formative total", current.subject),
                    ));
                }
                Some(_) => {}
                None => fa_totals.push((current.subject.clone(), incoming.fa_total_200m)),
            }
        }
    }

    // The formative total is one value per subject, shared by all its papers.
    for (subject, value) in fa_totals {
        for row in doc.summative.iter_mut().filter(|r| subject_eq(&r.subject, &subject)) {
            row.fa_total_200m = value;
        }
        changed += 1;
    }

    for incoming in &payload.attendance {
        let Some(idx) = month_index(&incoming.month) else {
            return Err(EngineError::validation("attendance.month", "unknown month"));
        };
        let current = doc
            .attendance
            .iter_mut()
            .find(|m| month_index(&m.month) == Some(idx))
            .ok_or_else(|| EngineError::validation("attendance.month", "month missing from report"))?;
        if current.working_days == incoming.working_days && current.present_days == incoming.present_days {
            continue;
        }
        policy::ensure(actor, Field::Attendance, has_data)?;
        current.working_days = incoming.working_days;
        current.present_days = incoming.present_days;
        changed += 1;
    }

    for incoming in &payload.co_curricular {
        let current = doc
            .co_curricular
            .iter_mut()
            .find(|c| subject_eq(&c.area, &incoming.area))
            .ok_or_else(|| unknown_subject("coCurricular.area", &incoming.area))?;
        if current.assessments == incoming.assessments {
            continue;
        }
        policy::ensure(actor, Field::CoCurricular { area: &current.area }, has_data)?;
        current.assessments = incoming.assessments.clone();
        changed += 1;
    }

    if let Some(requested) = &payload.second_language {
        let requested = normalized(requested);
        if requested != normalized(&doc.second_language) {
            if let Some(name) = &requested {
                if !doc.formative.iter().any(|f| subject_eq(&f.subject, name)) {
                    return Err(unknown_subject("secondLanguage", name));
                }
            }
            policy::ensure(actor, Field::SecondLanguage, has_data)?;
            doc.second_language = requested;
            changed += 1;
        }
    }

    if let Some(requested) = &payload.overall_grade_override {
        let requested = normalized(requested);
        if requested != normalized(&doc.overall_grade_override) {
            policy::ensure(actor, Field::OverallGrade, has_data)?;
            doc.overall_grade_override = requested;
            changed += 1;
        }
    }

    Ok(changed)
}

/// Creates the record on first save, starting from the same prefilled draft
/// `open` shows; afterwards patches it in place. The publication flag is
/// never touched here.
pub fn save<S, R, M>(
    store: &S,
    roster: &R,
    marks: &M,
    actor: &Actor,
    key: &ReportKey,
    payload: &SavePayload,
) -> EngineResult<SaveOutcome>
where
    S: ReportStore,
    R: RosterProvider,
    M: MarksProvider,
{
    if actor.role == Role::Student {
        return Err(record_forbidden(actor, "report"));
    }
    key.validate()?;
    payload.validate()?;
    let student = roster_student(roster, key)?;

    let mut changed_fields = 0;
    let outcome = store.upsert_report(key, &student.class_id, |existing| {
        let mut doc = match existing {
            Some(record) => record.doc.clone(),
            None => draft_doc(roster, marks, &student, key)?,
        };
        let has_data = doc.has_summative_or_attendance_data();
        changed_fields = apply_patch(&mut doc, payload, actor, has_data)?;
        if existing.is_some() && changed_fields == 0 {
            return Ok(None);
        }
        Ok(Some(doc))
    })?;

    if outcome.created {
        info!(
            record_id = %outcome.record.id,
            student_id = %key.student_id,
            actor = %actor.user_id,
            changed_fields,
            "report record created"
        );
    } else if outcome.written {
        info!(
            record_id = %outcome.record.id,
            actor = %actor.user_id,
            changed_fields,
            "report record updated"
        );
    }

    Ok(SaveOutcome {
        created: outcome.created,
        written: outcome.written,
        changed_fields,
        report: ReportView::of_record(actor, outcome.record),
    })
}

pub fn set_published<S: ReportStore>(
    store: &S,
    actor: &Actor,
    record_id: &str,
    desired: bool,
) -> EngineResult<PublishOutcome> {
    require_admin(actor, "isPublished")?;
    if record_id.trim().is_empty() {
        return Err(EngineError::validation("recordId", "must not be empty"));
    }
    let changed = store.set_published(record_id, desired)?;
    let record = store
        .find_report_by_id(record_id)?
        .ok_or_else(|| EngineError::not_found("report", record_id))?;
    if changed {
        info!(
            record_id,
            student_id = %record.key.student_id,
            is_published = desired,
            actor = %actor.user_id,
            "publication changed"
        );
    }
    Ok(PublishOutcome {
        record_id: record.id,
        is_published: record.is_published,
        changed,
        published_at: record.published_at,
    })
}

/// Flips every existing record of the class. Students without a record are
/// reported as skipped and no record is created for them; a failure on one
/// student does not stop the rest.
pub fn bulk_set_published<S, R>(
    store: &S,
    roster: &R,
    actor: &Actor,
    scope: &ReportScope,
    desired: bool,
) -> EngineResult<BulkPublishResult>
where
    S: ReportStore,
    R: RosterProvider,
{
    require_admin(actor, "isPublished")?;
    scope.validate()?;
    // Existence check for the class.
    roster.second_language(&scope.class_id)?;

    let mut result = BulkPublishResult::default();
    for student in roster.class_students(&scope.class_id, &scope.academic_year)? {
        let key = scope.key_for(&student);
        let flipped = store.find_report(&key).and_then(|found| match found {
            Some(record) => store.set_published(&record.id, desired).map(Some),
            None => Ok(None),
        });
        match flipped {
            Ok(Some(true)) => result.changed_count += 1,
            Ok(Some(false)) => result.unchanged_count += 1,
            Ok(None) => result.skipped_student_ids.push(student.id),
            Err(e) => {
                warn!(student_id = %student.id, code = e.code(), error = %e, "bulk publication failed");
                result.failed.push(BulkFailure {
                    student_id: student.id,
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        class_id = %scope.class_id,
        is_published = desired,
        changed = result.changed_count,
        unchanged = result.unchanged_count,
        skipped = result.skipped_student_ids.len(),
        failed = result.failed.len(),
        "bulk publication finished"
    );
    Ok(result)
}

/// What a student without a record starts from: the blank template with
/// recorded upstream marks copied in.
fn draft_doc<R, M>(roster: &R, marks: &M, student: &RosterStudent, key: &ReportKey) -> EngineResult<ReportDoc>
where
    R: RosterProvider,
    M: MarksProvider,
{
    let mut doc = blank_doc(roster, student)?;
    let mut recorded = marks.formative_marks(&student.id, &student.class_id, &key.academic_year)?;
    recorded.extend(marks.summative_marks(&student.id, &student.class_id, &key.academic_year)?);
    prefill(&mut doc, &recorded);
    Ok(doc)
}

/// Copies raw upstream marks into a fresh draft. Values outside the
/// template's bounds are left blank.
fn prefill(doc: &mut ReportDoc, marks: &[RecordedMark]) {
    let mut touched_formative: Vec<String> = Vec::new();

    for m in marks {
        let Some(value) = m.marks_obtained else {
            continue;
        };
        match m.assessment {
            AssessmentName::Formative { period, tool } => {
                if !(0.0..=TOOL_MAX[tool]).contains(&value) {
                    continue;
                }
                if let Some(record) = doc.formative_mut(&m.subject_name) {
                    record.periods.period_mut(period).set(tool, Some(value));
                    touched_formative.push(record.subject.clone());
                }
            }
            AssessmentName::Summative { exam, paper } => {
                let papers = papers_for_subject(&m.subject_name);
                let Some(paper_name) = papers.get(paper) else {
                    continue;
                };
                let max_marks = m.max_marks.filter(|v| *v > 0.0).unwrap_or(DEFAULT_SA_MAX_MARKS);
                if !(0.0..=max_marks).contains(&value) {
                    continue;
                }
                if let Some(row) = doc.summative_mut(&m.subject_name, paper_name) {
                    let entry = MarksEntry::scored(value, max_marks);
                    if exam == 0 {
                        row.sa1 = entry;
                    } else {
                        row.sa2 = entry;
                    }
                }
            }
        }
    }

    for subject in touched_formative {
        let Some(record) = doc.formative.iter().find(|f| subject_eq(&f.subject, &subject)) else {
            continue;
        };
        let total: f64 = record.periods.as_array().iter().map(|p| calc::period_total(p)).sum();
        for row in doc.summative.iter_mut().filter(|r| subject_eq(&r.subject, &subject)) {
            row.fa_total_200m = Some(total);
        }
    }
}

/// The stored record, or a prefilled draft when none exists. Students only
/// ever see published records.
pub fn open<S, R, M>(
    store: &S,
    roster: &R,
    marks: &M,
    actor: &Actor,
    key: &ReportKey,
) -> EngineResult<ReportView>
where
    S: ReportStore,
    R: RosterProvider,
    M: MarksProvider,
{
    key.validate()?;
    // Students read their own card and nobody else's.
    if actor.role == Role::Student && actor.user_id != key.student_id {
        return Err(EngineError::not_found("report", &key.student_id));
    }
    if let Some(record) = store.find_report(key)? {
        if actor.role == Role::Student && !record.is_published {
            return Err(EngineError::not_found("report", &key.student_id));
        }
        return Ok(ReportView::of_record(actor, record));
    }
    if actor.role == Role::Student {
        return Err(EngineError::not_found("report", &key.student_id));
    }

    let student = roster_student(roster, key)?;
    let doc = draft_doc(roster, marks, &student, key)?;
    Ok(ReportView::draft(actor, key.clone(), doc))
}

pub fn class_status<S, R>(store: &S, roster: &R, scope: &ReportScope) -> EngineResult<Vec<ClassStatusEntry>>
where
    S: ReportStore,
    R: RosterProvider,
{
    scope.validate()?;
    roster.second_language(&scope.class_id)?;
    let mut rows = Vec::new();
    for student in roster.class_students(&scope.class_id, &scope.academic_year)? {
        let record = store.find_report(&scope.key_for(&student))?;
        rows.push(ClassStatusEntry {
            has_report: record.is_some(),
            is_published: record.map(|r| r.is_published).unwrap_or(false),
            student_name: student.name,
            admission_id: student.admission_no,
            student_id: student.id,
        });
    }
    Ok(rows)
}
