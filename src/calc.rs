use serde::{Deserialize, Serialize};

use crate::grading::{scale_for, ScaleKind};
use crate::model::{
    AttendanceMonthEntry, CoCurricularRecord, FormativeSubjectRecord, MarksEntry, ReportDoc,
    SummativeSubjectPaperEntry, ToolScores, PERIODS,
};

/// SA components of the internal-marks formula are capped at this value no
/// matter what `maxMarks` the paper was set out of.
pub const LEGACY_SA_CAP: f64 = 80.0;
pub const LEGACY_INTERNAL_DIVISOR: f64 = 18.0;

/// Round half up to an integer: `Int(x + 0.5)`.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormativePeriodView {
    pub period: String,
    pub tools: ToolScores,
    pub total: f64,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormativeSubjectView {
    pub subject: String,
    pub second_language: bool,
    pub periods: Vec<FormativePeriodView>,
    pub overall_total: f64,
    pub overall_grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummativePaperView {
    pub subject: String,
    pub paper: String,
    pub second_language: bool,
    pub sa1: MarksEntry,
    pub sa2: MarksEntry,
    #[serde(rename = "faTotal200M")]
    pub fa_total_200m: Option<f64>,
    pub sa1_percentage: Option<f64>,
    pub sa1_grade: Option<String>,
    pub sa2_percentage: Option<f64>,
    pub sa2_grade: Option<String>,
    #[serde(rename = "faAveragePlusSa1_100M")]
    pub fa_average_plus_sa1_100m: Option<i64>,
    #[serde(rename = "internalMarks_20M")]
    pub internal_marks_20m: Option<i64>,
    #[serde(rename = "finalTotal100M")]
    pub final_total_100m: Option<i64>,
    pub final_grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub months: Vec<AttendanceMonthEntry>,
    pub total_working_days: u32,
    pub total_present_days: u32,
    pub attendance_percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoCurricularView {
    pub area: String,
    pub assessments: Vec<MarksEntry>,
    pub total_marks: f64,
    pub total_max_marks: f64,
    pub percentage: Option<f64>,
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallGrade {
    pub computed: Option<String>,
    pub manual_override: Option<String>,
    pub effective: Option<String>,
}

/// Every computed value of a report, alongside the raw inputs it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedReport {
    pub formative: Vec<FormativeSubjectView>,
    pub summative: Vec<SummativePaperView>,
    pub attendance: AttendanceSummary,
    pub co_curricular: Vec<CoCurricularView>,
    pub overall_grade: OverallGrade,
}

/// Nulls count as zero, so an untouched period totals 0 rather than being
/// left ungraded.
pub fn period_total(tools: &ToolScores) -> f64 {
    tools.as_array().iter().map(|t| t.unwrap_or(0.0)).sum()
}

pub fn period_grade(total: f64, second_language: bool) -> &'static str {
    scale_for(ScaleKind::FormativePeriod, second_language).lookup(total)
}

pub fn formative_subject(record: &FormativeSubjectRecord, second_language: bool) -> FormativeSubjectView {
    let periods: Vec<FormativePeriodView> = record
        .periods
        .as_array()
        .iter()
        .enumerate()
        .map(|(i, tools)| {
            let total = period_total(tools);
            FormativePeriodView {
                period: PERIODS[i].to_string(),
                tools: **tools,
                total,
                grade: period_grade(total, second_language).to_string(),
            }
        })
        .collect();
    let overall_total: f64 = periods.iter().map(|p| p.total).sum();
    FormativeSubjectView {
        subject: record.subject.clone(),
        second_language,
        periods,
        overall_total,
        overall_grade: scale_for(ScaleKind::OverallSubject, false)
            .lookup(overall_total)
            .to_string(),
    }
}

fn sa_grade(entry: &MarksEntry, second_language: bool) -> Option<String> {
    entry
        .percentage()
        .map(|pct| scale_for(ScaleKind::SummativePaper, second_language).lookup(pct).to_string())
}

/// A quarter of the formative total plus SA1 rescaled to 50.
pub fn fa_average_plus_sa1(fa_total_200m: Option<f64>, sa1: &MarksEntry) -> Option<i64> {
    let marks = sa1.marks?;
    if sa1.max_marks <= 0.0 {
        return None;
    }
    Some(round_half_up(
        fa_total_200m.unwrap_or(0.0) / 4.0 + marks * 50.0 / sa1.max_marks,
    ))
}

/// `(faTotal200M + min(sa1, 80) + min(sa2, 80)) / 18`, rounded. The divisor
/// and caps are fixed and ignore each paper's own maxMarks.
pub fn internal_marks(fa_total_200m: Option<f64>, sa1: &MarksEntry, sa2: &MarksEntry) -> Option<i64> {
    if fa_total_200m.is_none() && sa1.marks.is_none() && sa2.marks.is_none() {
        return None;
    }
    let sum = fa_total_200m.unwrap_or(0.0)
        + sa1.marks.unwrap_or(0.0).min(LEGACY_SA_CAP)
        + sa2.marks.unwrap_or(0.0).min(LEGACY_SA_CAP);
    Some(round_half_up(sum / LEGACY_INTERNAL_DIVISOR))
}

pub fn summative_paper(entry: &SummativeSubjectPaperEntry, second_language: bool) -> SummativePaperView {
    let internal = internal_marks(entry.fa_total_200m, &entry.sa1, &entry.sa2);
    let final_total = entry.sa2.marks.map(|sa2| {
        round_half_up(internal.unwrap_or(0) as f64 + sa2.min(LEGACY_SA_CAP))
    });
    let final_grade = final_total.map(|t| {
        scale_for(ScaleKind::Final100, second_language)
            .lookup(t as f64)
            .to_string()
    });
    SummativePaperView {
        subject: entry.subject.clone(),
        paper: entry.paper.clone(),
        second_language,
        sa1: entry.sa1,
        sa2: entry.sa2,
        fa_total_200m: entry.fa_total_200m,
        sa1_percentage: entry.sa1.percentage(),
        sa1_grade: sa_grade(&entry.sa1, second_language),
        sa2_percentage: entry.sa2.percentage(),
        sa2_grade: sa_grade(&entry.sa2, second_language),
        fa_average_plus_sa1_100m: fa_average_plus_sa1(entry.fa_total_200m, &entry.sa1),
        internal_marks_20m: internal,
        final_total_100m: final_total,
        final_grade,
    }
}

/// Most frequent grade. On a tie the grade seen first wins.
pub fn mode_grade<'a, I>(grades: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for g in grades {
        match counts.iter_mut().find(|(k, _)| *k == g) {
            Some(entry) => entry.1 += 1,
            None => counts.push((g, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (g, c) in counts {
        if best.map(|(_, bc)| c > bc).unwrap_or(true) {
            best = Some((g, c));
        }
    }
    best.map(|(g, _)| g.to_string())
}

pub fn overall_grade(papers: &[SummativePaperView], manual_override: Option<&str>) -> OverallGrade {
    let computed = mode_grade(papers.iter().filter_map(|p| p.final_grade.as_deref()));
    let manual_override = manual_override
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string);
    let effective = manual_override.clone().or_else(|| computed.clone());
    OverallGrade {
        computed,
        manual_override,
        effective,
    }
}

pub fn attendance_summary(months: &[AttendanceMonthEntry]) -> AttendanceSummary {
    let total_working_days: u32 = months.iter().map(|m| m.working_days).sum();
    let total_present_days: u32 = months.iter().map(|m| m.present_days).sum();
    let attendance_percentage = if total_working_days > 0 {
        round_half_up(total_present_days as f64 / total_working_days as f64 * 100.0)
    } else {
        0
    };
    AttendanceSummary {
        months: months.to_vec(),
        total_working_days,
        total_present_days,
        attendance_percentage,
    }
}

/// Only entered sub-assessments contribute to the denominator.
pub fn co_curricular(record: &CoCurricularRecord) -> CoCurricularView {
    let mut total_marks = 0.0_f64;
    let mut total_max_marks = 0.0_f64;
    for a in &record.assessments {
        if let Some(m) = a.marks {
            total_marks += m;
            total_max_marks += a.max_marks;
        }
    }
    let percentage = if total_max_marks > 0.0 {
        Some(total_marks / total_max_marks * 100.0)
    } else {
        None
    };
    CoCurricularView {
        area: record.area.clone(),
        assessments: record.assessments.clone(),
        total_marks,
        total_max_marks,
        percentage,
        grade: percentage.map(|p| scale_for(ScaleKind::CoCurricular, false).lookup(p).to_string()),
    }
}

pub fn derive_report(doc: &ReportDoc) -> DerivedReport {
    let formative = doc
        .formative
        .iter()
        .map(|f| formative_subject(f, doc.is_second_language(&f.subject)))
        .collect();
    let summative: Vec<SummativePaperView> = doc
        .summative
        .iter()
        .map(|e| summative_paper(e, doc.is_second_language(&e.subject)))
        .collect();
    let overall = overall_grade(&summative, doc.overall_grade_override.as_deref());
    DerivedReport {
        formative,
        summative,
        attendance: attendance_summary(&doc.attendance),
        co_curricular: doc.co_curricular.iter().map(co_curricular).collect(),
        overall_grade: overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{blank_attendance, StudentInfo};

    fn doc_with(subjects: &[&str], second_language: Option<&str>) -> ReportDoc {
        let subjects: Vec<String> = subjects.iter().map(|s| s.to_string()).collect();
        ReportDoc::blank(
            StudentInfo::default(),
            "class-1",
            &subjects,
            second_language.map(str::to_string),
        )
    }

    #[test]
    fn round_half_up_matches_int_plus_half() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(77.5), 78);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn full_marks_period_is_fifty_and_top_band() {
        let mut rec = FormativeSubjectRecord::empty("Maths");
        rec.periods.fa1 = ToolScores::new(10.0, 10.0, 10.0, 20.0);
        let view = formative_subject(&rec, false);
        assert_eq!(view.periods[0].total, 50.0);
        assert_eq!(view.periods[0].grade, "A1");
    }

    #[test]
    fn untouched_period_totals_zero_and_is_graded() {
        let rec = FormativeSubjectRecord::empty("Maths");
        let view = formative_subject(&rec, false);
        for p in &view.periods {
            assert_eq!(p.total, 0.0);
            assert_eq!(p.grade, "D2");
        }
        assert_eq!(view.overall_total, 0.0);
    }

    #[test]
    fn partial_tools_sum_with_nulls_as_zero() {
        let tools = ToolScores {
            tool1: Some(7.0),
            tool2: None,
            tool3: Some(9.5),
            tool4: Some(15.0),
        };
        assert_eq!(period_total(&tools), 31.5);
    }

    #[test]
    fn in_bounds_tool_scores_keep_period_total_within_fifty() {
        use crate::model::TOOL_MAX;

        fn steps(max: f64) -> impl Iterator<Item = f64> {
            (0..=(max * 2.0) as u32).map(|h| h as f64 * 0.5)
        }
        for t1 in steps(TOOL_MAX[0]) {
            for t2 in steps(TOOL_MAX[1]) {
                for t3 in steps(TOOL_MAX[2]) {
                    for t4 in steps(TOOL_MAX[3]) {
                        let tools = ToolScores::new(t1, t2, t3, t4);
                        let total = period_total(&tools);
                        assert_eq!(total, t1 + t2 + t3 + t4);
                        assert!((0.0..=50.0).contains(&total), "{:?} -> {}", tools, total);
                    }
                }
            }
        }
    }

    #[test]
    fn overall_formative_total_is_sum_of_periods() {
        let mut rec = FormativeSubjectRecord::empty("Hindi");
        rec.periods.fa1 = ToolScores::new(10.0, 10.0, 10.0, 20.0);
        rec.periods.fa2 = ToolScores::new(9.0, 9.0, 9.0, 18.0);
        rec.periods.fa3 = ToolScores::new(8.0, 8.0, 8.0, 16.0);
        rec.periods.fa4 = ToolScores::new(5.0, 5.0, 5.0, 10.0);
        let view = formative_subject(&rec, true);
        let sum: f64 = view.periods.iter().map(|p| p.total).sum();
        assert_eq!(view.overall_total, sum);
        assert_eq!(view.overall_total, 160.0);
        assert_eq!(view.overall_grade, "B1");
        // 25 of 50 is C1 on the lenient second-language table, C2 otherwise.
        assert_eq!(view.periods[3].grade, "C1");
        assert_eq!(formative_subject(&rec, false).periods[3].grade, "C2");
        assert_eq!(period_grade(22.0, true), "C2");
        assert_eq!(period_grade(22.0, false), "C2");
        assert_eq!(period_grade(20.0, true), "C2");
        assert_eq!(period_grade(20.0, false), "D1");
    }

    #[test]
    fn summative_row_derives_every_value() {
        let mut entry = SummativeSubjectPaperEntry::empty("Maths", "I");
        entry.fa_total_200m = Some(160.0);
        entry.sa1 = MarksEntry::scored(60.0, 80.0);
        entry.sa2 = MarksEntry::scored(70.0, 80.0);
        let view = summative_paper(&entry, false);
        assert_eq!(view.sa1_percentage, Some(75.0));
        assert_eq!(view.sa1_grade.as_deref(), Some("B1"));
        assert_eq!(view.sa2_grade.as_deref(), Some("A2"));
        // 160/4 + 60*50/80 = 77.5
        assert_eq!(view.fa_average_plus_sa1_100m, Some(78));
        // (160 + 60 + 70) / 18 = 16.11
        assert_eq!(view.internal_marks_20m, Some(16));
        assert_eq!(view.final_total_100m, Some(86));
        assert_eq!(view.final_grade.as_deref(), Some("A2"));
    }

    #[test]
    fn second_language_sa1_half_marks_uses_lenient_table() {
        let mut entry = SummativeSubjectPaperEntry::empty("Hindi", "I");
        entry.sa1 = MarksEntry::scored(40.0, 80.0);
        assert_eq!(summative_paper(&entry, true).sa1_grade.as_deref(), Some("C1"));
        assert_eq!(summative_paper(&entry, false).sa1_grade.as_deref(), Some("C2"));
    }

    #[test]
    fn internal_marks_keep_the_legacy_eighty_cap() {
        let mut entry = SummativeSubjectPaperEntry::empty("English", "I");
        entry.fa_total_200m = Some(180.0);
        entry.sa1 = MarksEntry::scored(95.0, 100.0);
        entry.sa2 = MarksEntry::scored(90.0, 100.0);
        let view = summative_paper(&entry, false);
        // (180 + 80 + 80) / 18 = 18.89
        assert_eq!(view.internal_marks_20m, Some(19));
        assert_eq!(view.final_total_100m, Some(99));
        // 180/4 + 95*50/100 = 92.5
        assert_eq!(view.fa_average_plus_sa1_100m, Some(93));
        assert_eq!(view.final_grade.as_deref(), Some("A1"));
    }

    #[test]
    fn final_total_waits_for_sa2() {
        let mut entry = SummativeSubjectPaperEntry::empty("Maths", "I");
        entry.fa_total_200m = Some(150.0);
        entry.sa1 = MarksEntry::scored(50.0, 80.0);
        let view = summative_paper(&entry, false);
        assert!(view.internal_marks_20m.is_some());
        assert_eq!(view.final_total_100m, None);
        assert_eq!(view.final_grade, None);
        assert_eq!(view.sa2_grade, None);

        let blank = summative_paper(&SummativeSubjectPaperEntry::empty("Maths", "I"), false);
        assert_eq!(blank.internal_marks_20m, None);
        assert_eq!(blank.fa_average_plus_sa1_100m, None);
    }

    #[test]
    fn mode_grade_prefers_first_seen_on_tie() {
        assert_eq!(
            mode_grade(["B1", "A1", "A1", "B1", "C1"]),
            Some("B1".to_string())
        );
        assert_eq!(mode_grade(["C1", "A1", "A1"]), Some("A1".to_string()));
        assert_eq!(mode_grade(Vec::<&str>::new()), None);
    }

    #[test]
    fn manual_override_wins_until_cleared() {
        let mut doc = doc_with(&["Maths", "Hindi"], Some("Hindi"));
        for e in doc.summative.iter_mut() {
            e.fa_total_200m = Some(180.0);
            e.sa1 = MarksEntry::scored(75.0, 80.0);
            e.sa2 = MarksEntry::scored(78.0, 80.0);
        }
        let derived = derive_report(&doc);
        assert_eq!(derived.overall_grade.computed.as_deref(), Some("A1"));
        assert_eq!(derived.overall_grade.effective.as_deref(), Some("A1"));

        doc.overall_grade_override = Some("A2".to_string());
        let derived = derive_report(&doc);
        assert_eq!(derived.overall_grade.effective.as_deref(), Some("A2"));
        assert_eq!(derived.overall_grade.computed.as_deref(), Some("A1"));

        doc.overall_grade_override = Some("  ".to_string());
        let derived = derive_report(&doc);
        assert_eq!(derived.overall_grade.effective.as_deref(), Some("A1"));
    }

    #[test]
    fn no_final_grades_leaves_overall_unset() {
        let derived = derive_report(&doc_with(&["Maths"], None));
        assert_eq!(derived.overall_grade, OverallGrade::default());
    }

    #[test]
    fn attendance_totals_and_percentage() {
        let mut months = blank_attendance();
        months[0].working_days = 20;
        months[0].present_days = 18;
        months[1].working_days = 22;
        months[1].present_days = 20;
        let summary = attendance_summary(&months);
        assert_eq!(summary.total_working_days, 42);
        assert_eq!(summary.total_present_days, 38);
        assert_eq!(summary.attendance_percentage, round_half_up(38.0 / 42.0 * 100.0));
        assert_eq!(summary.attendance_percentage, 90);

        let empty = attendance_summary(&blank_attendance());
        assert_eq!(empty.attendance_percentage, 0);
    }

    #[test]
    fn co_curricular_grade_over_entered_assessments() {
        let mut rec = CoCurricularRecord::empty("Art & Cultural Education");
        let view = co_curricular(&rec);
        assert_eq!(view.grade, None);

        rec.assessments[0].marks = Some(45.0);
        rec.assessments[1].marks = Some(45.0);
        let view = co_curricular(&rec);
        assert_eq!(view.total_marks, 90.0);
        assert_eq!(view.total_max_marks, 100.0);
        assert_eq!(view.grade.as_deref(), Some("A+"));
    }

    #[test]
    fn derived_report_is_stable_across_recomputation() {
        let mut doc = doc_with(&["English", "Science", "Telugu"], Some("Telugu"));
        for (i, e) in doc.summative.iter_mut().enumerate() {
            e.fa_total_200m = Some(120.0 + i as f64 * 10.0);
            e.sa1 = MarksEntry::scored(41.0 + i as f64, 80.0);
            e.sa2 = MarksEntry::scored(52.5 + i as f64, 80.0);
        }
        let first = derive_report(&doc);
        let encoded = serde_json::to_string(&first).expect("encode");
        let decoded: DerivedReport = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, derive_report(&doc));
    }
}
