mod test_support;

use serde_json::json;
use test_support::{error_code, request_err, request_ok, seed_class, spawn_sidecar, temp_dir};

#[test]
fn bulk_publish_flips_existing_records_and_skips_absent_students() {
    let workspace = temp_dir("reportcard-bulk-publish");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (class_id, students) = seed_class(&mut stdin, &mut reader, 30);
    let admin = json!({ "role": "admin", "userId": "admin-1" });

    for (i, student_id) in students.iter().take(25).enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("save-{}", i),
            "reports.save",
            json!({
                "actor": admin,
                "studentId": student_id,
                "payload": { "attendance": [{ "month": "June", "workingDays": 22, "presentDays": 20 }] }
            }),
        );
    }

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "reports.bulkSetPublished",
        json!({
            "actor": { "role": "teacher", "userId": "t-mat" },
            "classId": class_id,
            "isPublished": true
        }),
    );
    assert_eq!(error_code(&error), "edit_forbidden");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.bulkSetPublished",
        json!({ "actor": admin, "classId": class_id, "isPublished": true }),
    );
    assert_eq!(result["changedCount"].as_u64(), Some(25));
    assert_eq!(result["unchangedCount"].as_u64(), Some(0));
    assert_eq!(
        result["skippedStudentIds"].as_array().map(|a| a.len()),
        Some(5)
    );
    assert_eq!(result["failed"].as_array().map(|a| a.len()), Some(0));

    let status = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.classStatus",
        json!({ "classId": class_id }),
    );
    let rows = status["students"].as_array().expect("students");
    assert_eq!(rows.len(), 30);
    assert_eq!(rows.iter().filter(|r| r["isPublished"] == true).count(), 25);
    let absent: Vec<&serde_json::Value> = rows.iter().filter(|r| r["hasReport"] == false).collect();
    assert_eq!(absent.len(), 5);
    assert_eq!(absent[0]["studentName"], "Student 25");
    assert_eq!(absent[0]["admissionId"], "ADM025");

    // Skipped students really stay absent.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.open",
        json!({ "actor": admin, "studentId": students[29] }),
    );
    assert_eq!(opened["report"]["hasReport"], false);

    let unpublish = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.bulkSetPublished",
        json!({ "actor": admin, "classId": class_id, "isPublished": false }),
    );
    assert_eq!(unpublish["changedCount"].as_u64(), Some(25));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "reports.bulkSetPublished",
        json!({ "actor": admin, "classId": "missing", "isPublished": true }),
    );
    assert_eq!(error_code(&error), "not_found");
}
