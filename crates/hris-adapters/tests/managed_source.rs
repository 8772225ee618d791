use hris_adapters::{parse_date, parse_identifier, split_name, CsvSource, SourceError, Window};

const HIRED: &str = "\u{feff}id, name ,datetime,department_id,job_id\n\
1,John Doe,2021-07-27T16:02:08Z,5,3\n\
2,Jane,2021-07-28,NaN,3\n\
3,Ann Lee,2021-07-29\n";

#[tokio::test]
async fn managed_file_rows_normalize_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hired_employees.csv"), HIRED).unwrap();

    let csv = CsvSource::file(dir.path(), "hired_employees.csv")
        .read(None)
        .await
        .unwrap();
    assert_eq!(csv.total, 3);
    assert!(csv.missing_columns(&["id", "name", "datetime"]).is_empty());

    let first = &csv.rows[0];
    assert_eq!(parse_identifier(first.get("id")), Some(1));
    assert_eq!(split_name(first.get("name")).unwrap().last, "Doe");
    assert!(parse_date(first.get("datetime")).is_some());

    assert_eq!(parse_identifier(csv.rows[1].get("department_id")), None);
    assert_eq!(split_name(csv.rows[1].get("name")).unwrap().last, "");
    assert_eq!(csv.rows[2].get("job_id"), "");
}

#[tokio::test]
async fn windows_outside_bounds_and_escaping_names_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(Window::new(-1, 10), Err(SourceError::InvalidWindow(_))));
    assert!(matches!(Window::new(0, 10_001), Err(SourceError::InvalidWindow(_))));

    let escaping = CsvSource::file(dir.path(), "../hired_employees.csv").read(None).await;
    assert!(matches!(escaping, Err(SourceError::InvalidFileName(_))));

    let absent = CsvSource::file(dir.path(), "absent.csv").read(None).await;
    assert!(matches!(absent, Err(SourceError::NotFound(_))));
}
