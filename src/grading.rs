use serde::Serialize;

/// One row of a threshold table: any score `>= min` earns `grade`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub min: f64,
    pub grade: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScale {
    pub key: &'static str,
    pub second_language: bool,
    /// Percentage-based scales are looked up on `marks / maxMarks * 100`.
    pub percentage: bool,
    pub bands: &'static [Band],
}

impl GradeScale {
    /// Scans from the highest band down and returns the first band the score
    /// meets. Anything below the last band still gets the lowest grade.
    pub fn lookup(&self, score: f64) -> &'static str {
        for band in self.bands {
            if score >= band.min {
                return band.grade;
            }
        }
        self.bands.last().map(|b| b.grade).unwrap_or("")
    }

    pub fn grades(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bands.iter().map(|b| b.grade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    FormativePeriod,
    OverallSubject,
    SummativePaper,
    Final100,
    CoCurricular,
}

const fn b(min: f64, grade: &'static str) -> Band {
    Band { min, grade }
}

const FA_STANDARD_BANDS: [Band; 8] = [
    b(46.0, "A1"),
    b(41.0, "A2"),
    b(36.0, "B1"),
    b(31.0, "B2"),
    b(26.0, "C1"),
    b(21.0, "C2"),
    b(18.0, "D1"),
    b(0.0, "D2"),
];

const FA_SECOND_LANGUAGE_BANDS: [Band; 8] = [
    b(45.0, "A1"),
    b(40.0, "A2"),
    b(34.0, "B1"),
    b(29.0, "B2"),
    b(23.0, "C1"),
    b(18.0, "C2"),
    b(10.0, "D1"),
    b(0.0, "D2"),
];

const OVERALL_200_BANDS: [Band; 8] = [
    b(183.0, "A1"),
    b(163.0, "A2"),
    b(143.0, "B1"),
    b(123.0, "B2"),
    b(103.0, "C1"),
    b(83.0, "C2"),
    b(70.0, "D1"),
    b(0.0, "D2"),
];

// Summative papers and the final 100-mark total publish the same cut points.
const HUNDRED_STANDARD_BANDS: [Band; 8] = [
    b(91.0, "A1"),
    b(81.0, "A2"),
    b(71.0, "B1"),
    b(61.0, "B2"),
    b(51.0, "C1"),
    b(41.0, "C2"),
    b(35.0, "D1"),
    b(0.0, "D2"),
];

const HUNDRED_SECOND_LANGUAGE_BANDS: [Band; 8] = [
    b(90.0, "A1"),
    b(79.0, "A2"),
    b(68.0, "B1"),
    b(57.0, "B2"),
    b(46.0, "C1"),
    b(35.0, "C2"),
    b(20.0, "D1"),
    b(0.0, "D2"),
];

const CO_CURRICULAR_BANDS: [Band; 5] = [
    b(85.0, "A+"),
    b(71.0, "A"),
    b(56.0, "B"),
    b(41.0, "C"),
    b(0.0, "D"),
];

pub const FORMATIVE_PERIOD: GradeScale = GradeScale {
    key: "formativePeriod",
    second_language: false,
    percentage: false,
    bands: &FA_STANDARD_BANDS,
};

pub const FORMATIVE_PERIOD_SECOND_LANGUAGE: GradeScale = GradeScale {
    key: "formativePeriod",
    second_language: true,
    percentage: false,
    bands: &FA_SECOND_LANGUAGE_BANDS,
};

pub const OVERALL_SUBJECT: GradeScale = GradeScale {
    key: "overallSubject",
    second_language: false,
    percentage: false,
    bands: &OVERALL_200_BANDS,
};

pub const SUMMATIVE_PAPER: GradeScale = GradeScale {
    key: "summativePaper",
    second_language: false,
    percentage: true,
    bands: &HUNDRED_STANDARD_BANDS,
};

pub const SUMMATIVE_PAPER_SECOND_LANGUAGE: GradeScale = GradeScale {
    key: "summativePaper",
    second_language: true,
    percentage: true,
    bands: &HUNDRED_SECOND_LANGUAGE_BANDS,
};

pub const FINAL_100: GradeScale = GradeScale {
    key: "final100",
    second_language: false,
    percentage: false,
    bands: &HUNDRED_STANDARD_BANDS,
};

pub const FINAL_100_SECOND_LANGUAGE: GradeScale = GradeScale {
    key: "final100",
    second_language: true,
    percentage: false,
    bands: &HUNDRED_SECOND_LANGUAGE_BANDS,
};

pub const CO_CURRICULAR: GradeScale = GradeScale {
    key: "coCurricular",
    second_language: false,
    percentage: true,
    bands: &CO_CURRICULAR_BANDS,
};

/// Picks the table for an assessment kind. Only the formative period,
/// summative paper and final scales have a second-language variant.
pub fn scale_for(kind: ScaleKind, second_language: bool) -> &'static GradeScale {
    match (kind, second_language) {
        (ScaleKind::FormativePeriod, false) => &FORMATIVE_PERIOD,
        (ScaleKind::FormativePeriod, true) => &FORMATIVE_PERIOD_SECOND_LANGUAGE,
        (ScaleKind::OverallSubject, _) => &OVERALL_SUBJECT,
        (ScaleKind::SummativePaper, false) => &SUMMATIVE_PAPER,
        (ScaleKind::SummativePaper, true) => &SUMMATIVE_PAPER_SECOND_LANGUAGE,
        (ScaleKind::Final100, false) => &FINAL_100,
        (ScaleKind::Final100, true) => &FINAL_100_SECOND_LANGUAGE,
        (ScaleKind::CoCurricular, _) => &CO_CURRICULAR,
    }
}

pub fn all_scales() -> [&'static GradeScale; 8] {
    [
        &FORMATIVE_PERIOD,
        &FORMATIVE_PERIOD_SECOND_LANGUAGE,
        &OVERALL_SUBJECT,
        &SUMMATIVE_PAPER,
        &SUMMATIVE_PAPER_SECOND_LANGUAGE,
        &FINAL_100,
        &FINAL_100_SECOND_LANGUAGE,
        &CO_CURRICULAR,
    ]
}

/// True when `grade` is one of the eight academic bands (A1..D2). Manual
/// overall-grade overrides must be one of these.
pub fn is_academic_grade(grade: &str) -> bool {
    HUNDRED_STANDARD_BANDS.iter().any(|b| b.grade == grade)
}
