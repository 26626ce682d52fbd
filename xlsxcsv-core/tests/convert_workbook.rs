mod common;

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use common::{worksheet, zip_parts, Book};
use tempfile::{tempdir, NamedTempFile};
use xlsxcsv_core::{
    convert_workbook, ConvertOptions, FailurePolicy, Package, Parallelism, SheetSelection,
    SheetStats, WorkbookContext, WorkbookConverter, XlsxCsvError,
};

fn read(dir: &Path, file: &str) -> String {
    fs::read_to_string(dir.join(file)).unwrap()
}

fn sales_book() -> Book {
    Book::new()
        .shared_strings(&["Region", "Total", "North", "South, East", "Note \"x\""])
        .sheet(
            "Sales",
            worksheet(
                "A1:B4",
                r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>1200</v></c></row>
<row r="4"><c r="A4" t="s"><v>3</v></c><c r="B4"><v>950.5</v></c></row>"#,
            ),
        )
        .sheet(
            "Notes",
            worksheet("A1:A1", r#"<row r="1"><c r="A1" t="s"><v>4</v></c></row>"#),
        )
        .hidden_sheet(
            "Lookup",
            "hidden",
            worksheet("A1:A1", r#"<row r="1"><c r="A1"><v>42</v></c></row>"#),
        )
}

#[test]
fn test_converts_every_visible_sheet() {
    let package = Package::from_bytes(sales_book().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let report = convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();

    assert_eq!(report.sheets.len(), 2);
    assert!(!report.has_failures());
    assert_eq!(report.sheets[0].name, "Sales");
    assert_eq!(report.sheets[1].name, "Notes");

    assert_eq!(
        read(out.path(), "Sales.csv"),
        "Region,Total\nNorth,1200\n,\n\"South, East\",950.5\n"
    );
    assert_eq!(read(out.path(), "Notes.csv"), "\"Note \"\"x\"\"\"\n");
    assert!(!out.path().join("Lookup.csv").exists());

    let sales = report.sheets[0].stats().unwrap();
    assert_eq!(sales.rows_written, 4);
    assert_eq!(sales.rows_covered, 4);
    assert_eq!(report.rows_written(), 5);
}

#[test]
fn test_hidden_sheets_on_request() {
    let package = Package::from_bytes(sales_book().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let selection = SheetSelection::new().with_include_hidden(true);
    let report = convert_workbook(
        &package,
        &selection,
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();

    assert_eq!(report.sheets.len(), 3);
    assert_eq!(read(out.path(), "Lookup.csv"), "42\n");
}

#[test]
fn test_remove_empty_rows_with_index() {
    let package = Package::from_bytes(sales_book().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let options = ConvertOptions::new()
        .with_indexed(true)
        .with_remove_empty_rows(true);
    let selection = SheetSelection::new().with_names(["Sales"]);
    let report = convert_workbook(&package, &selection, options, out.path(), FailurePolicy::Abort).unwrap();

    assert_eq!(
        read(out.path(), "Sales.csv"),
        "\"1\",Region,Total\n\"2\",North,1200\n\"3\",\"South, East\",950.5\n"
    );
    let stats = report.sheets[0].stats().unwrap();
    assert_eq!(stats.rows_written, 3);
    assert_eq!(stats.rows_covered, 4);
}

#[test]
fn test_renames_become_sanitized_file_names() {
    let package = Package::from_bytes(sales_book().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let selection = SheetSelection::new()
        .with_names(["Notes", "Sales"])
        .with_renames(["notes: draft", "sales/2024"]);
    let report = convert_workbook(
        &package,
        &selection,
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();

    assert_eq!(report.sheets[0].output_path, out.path().join("notes_ draft.csv"));
    assert_eq!(report.sheets[1].output_path, out.path().join("sales_2024.csv"));
    assert!(out.path().join("notes_ draft.csv").exists());
    assert!(out.path().join("sales_2024.csv").exists());
}

#[test]
fn test_selection_errors_write_nothing() {
    let package = Package::from_bytes(sales_book().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let selection = SheetSelection::new().with_names(["Sales", "Sheet9", "Lookup"]);
    let err = convert_workbook(
        &package,
        &selection,
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Continue,
    )
    .unwrap_err();
    match err {
        XlsxCsvError::UnknownSheet { missing } => assert_eq!(missing, vec!["Sheet9", "Lookup"]),
        other => panic!("unexpected error: {other}"),
    }

    let selection = SheetSelection::new()
        .with_names(["Sales", "Notes"])
        .with_renames(["a", "b", "c"]);
    let err = convert_workbook(
        &package,
        &selection,
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Continue,
    )
    .unwrap_err();
    assert!(matches!(err, XlsxCsvError::RenameCountMismatch { names: 2, renames: 3 }));

    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

fn book_with_broken_first_sheet() -> Book {
    Book::new()
        .sheet(
            "Broken",
            r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData></worksheet>"#,
        )
        .sheet("Good", worksheet("A1:B1", r#"<row r="1"><c r="B1"><v>7</v></c></row>"#))
}

#[test]
fn test_continue_policy_records_failures() {
    let package = Package::from_bytes(book_with_broken_first_sheet().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let report = convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Continue,
    )
    .unwrap();

    assert!(report.has_failures());
    let failed: Vec<_> = report.failures().map(|s| s.name.as_str()).collect();
    assert_eq!(failed, vec!["Broken"]);
    assert!(matches!(
        report.sheets[0].error(),
        Some(XlsxCsvError::MissingDimension { sheet }) if sheet == "Broken"
    ));
    assert_eq!(read(out.path(), "Good.csv"), ",7\n");
}

#[test]
fn test_abort_policy_stops_at_first_failure() {
    let package = Package::from_bytes(book_with_broken_first_sheet().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let err = WorkbookConverter::new(&package)
        .parallelism(Parallelism::Sequential)
        .run(out.path())
        .unwrap_err();

    assert!(matches!(err, XlsxCsvError::MissingDimension { .. }));
    assert!(!out.path().join("Good.csv").exists());
}

#[test]
fn test_shared_string_cell_without_table_fails_the_sheet() {
    let book = Book::new().sheet(
        "Data",
        worksheet("A1:A1", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#),
    );
    let package = Package::from_bytes(book.to_bytes()).unwrap();
    assert!(package.shared_strings_path().is_none());

    let out = tempdir().unwrap();
    let err = convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap_err();
    assert!(matches!(err, XlsxCsvError::MissingPart { ref sheet, .. } if sheet == "Data"));
}

#[test]
fn test_number_formats_from_styles() {
    let book = Book::new()
        .cell_formats(&[(164, "dd/mm/yyyy hh:mm"), (165, "0.00E+00")], &[0, 14, 164, 165, 11])
        .sheet(
            "Formats",
            worksheet(
                "A1:E1",
                r#"<row r="1"><c r="A1"><v>41234</v></c><c r="B1" s="1"><v>41234</v></c><c r="C1" s="2"><v>41234.75</v></c><c r="D1" s="3"><v>1.25E+3</v></c><c r="E1" s="4"><v>-4.5E-2</v></c></row>"#,
            ),
        );
    let package = Package::from_bytes(book.to_bytes()).unwrap();
    let out = tempdir().unwrap();

    convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();

    assert_eq!(
        read(out.path(), "Formats.csv"),
        "41234,2012-11-21T00:00:00,2012-11-21T18:00:00,1250,-0.045\n"
    );
}

#[test]
fn test_null_errors() {
    let book = Book::new().sheet(
        "Calc",
        worksheet(
            "A1:C1",
            r#"<row r="1"><c r="A1" t="e"><f>1/0</f><v>#DIV/0!</v></c><c r="B1" t="e"><v>#REF!</v></c><c r="C1"><v>3</v></c></row>"#,
        ),
    );
    let package = Package::from_bytes(book.to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let options = ConvertOptions::new().with_treat_errors_as_empty(true);
    convert_workbook(&package, &SheetSelection::default(), options, out.path(), FailurePolicy::Abort).unwrap();

    assert_eq!(read(out.path(), "Calc.csv"), ",,3\n");
}

#[test]
fn test_open_from_file_and_truncate_existing_output() {
    let file = NamedTempFile::new().unwrap();
    sales_book().write_to(file.path());
    let package = Package::open(file.path()).unwrap();
    assert_eq!(package.path(), Some(file.path()));

    let out = tempdir().unwrap();
    fs::write(out.path().join("Notes.csv"), "stale content that is much longer than the new file\n").unwrap();

    let selection = SheetSelection::new().with_names(["Notes"]);
    convert_workbook(
        &package,
        &selection,
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();

    assert_eq!(read(out.path(), "Notes.csv"), "\"Note \"\"x\"\"\"\n");
}

#[test]
fn test_parallel_and_sequential_agree() {
    let mut book = Book::new().shared_strings(&["a", "b"]);
    for i in 0..6 {
        let rows: String = (1..=50)
            .map(|r| {
                format!(
                    r#"<row r="{r}"><c r="A{r}" t="s"><v>{}</v></c><c r="C{r}"><v>{}</v></c></row>"#,
                    r % 2,
                    r * i
                )
            })
            .collect();
        book = book.sheet(&format!("S{}", i), worksheet("A1:C50", &rows));
    }
    let package = Package::from_bytes(book.to_bytes()).unwrap();

    let parallel = tempdir().unwrap();
    let sequential = tempdir().unwrap();
    WorkbookConverter::new(&package).run(parallel.path()).unwrap();
    WorkbookConverter::new(&package)
        .parallelism(Parallelism::Sequential)
        .run(sequential.path())
        .unwrap();

    for i in 0..6 {
        let name = format!("S{}.csv", i);
        assert_eq!(read(parallel.path(), &name), read(sequential.path(), &name));
    }
    assert!(read(parallel.path(), "S3.csv").starts_with("b,,3\na,,6\n"));
}

fn single_column_sheet(rows: u32, value: &str) -> String {
    let data: String = (1..=rows)
        .map(|r| format!(r#"<row r="{r}"><c r="A{r}"><v>{value}</v></c></row>"#))
        .collect();
    worksheet(&format!("A1:A{}", rows), &data)
}

#[test]
fn test_sheets_sharing_an_output_file_do_not_interleave() {
    let book = Book::new()
        .sheet("Long", single_column_sheet(20_000, "1"))
        .sheet("Short", single_column_sheet(6_000, "222222"))
        .sheet("Other", single_column_sheet(10, "7"));
    let package = Package::from_bytes(book.to_bytes()).unwrap();
    let expected_short = "222222\n".repeat(6_000);

    for renames in [["x", "x", "y"], ["a/b", "a_b", "y"], ["x", "X", "y"]] {
        let out = tempdir().unwrap();
        let report = WorkbookConverter::new(&package)
            .selection(SheetSelection::new().with_renames(renames))
            .run(out.path())
            .unwrap();

        assert!(!report.has_failures());
        assert_eq!(report.sheets.len(), 3);
        assert_eq!(report.sheets[0].name, "Long");
        assert_eq!(report.sheets[1].name, "Short");
        assert_eq!(report.sheets[2].name, "Other");

        let shared = report.sheets[1].output_path.clone();
        assert_eq!(fs::read_to_string(&shared).unwrap(), expected_short, "{renames:?}");
        assert_eq!(read(out.path(), "y.csv"), "7\n".repeat(10));
    }
}

#[test]
fn test_progress_callback_sees_every_sheet() {
    let package = Package::from_bytes(sales_book().to_bytes()).unwrap();
    let out = tempdir().unwrap();

    let seen = Mutex::new(Vec::new());
    let progress = |sheet: &str, stats: &SheetStats| {
        seen.lock().unwrap().push((sheet.to_string(), stats.rows_covered));
    };
    WorkbookConverter::new(&package)
        .progress(&progress)
        .run(out.path())
        .unwrap();

    let mut seen = seen.into_inner().unwrap();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("Notes".to_string(), 1),
            ("Sales".to_string(), 1),
            ("Sales".to_string(), 2),
            ("Sales".to_string(), 3),
            ("Sales".to_string(), 4),
        ]
    );
}

#[test]
fn test_relationship_targets_are_resolved() {
    let sheet = worksheet("A1:A1", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#);
    let bytes = zip_parts([
        (
            "_rels/.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="/book/main.xml"/></Relationships>"#,
        ),
        (
            "book/main.xml",
            r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Only" sheetId="1" r:id="rId7"/></sheets></workbook>"#,
        ),
        (
            "book/_rels/main.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/data/first.xml"/><Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="../text/strings.xml"/></Relationships>"#,
        ),
        ("data/first.xml", sheet.as_str()),
        ("text/strings.xml", r#"<sst><si><t>resolved</t></si></sst>"#),
    ]);

    let package = Package::from_bytes(bytes).unwrap();
    assert_eq!(package.workbook_path(), "book/main.xml");
    assert_eq!(package.worksheet_path("rId7"), Some("data/first.xml"));
    assert_eq!(package.shared_strings_path(), Some("text/strings.xml"));
    assert_eq!(package.styles_path(), None);

    let context = WorkbookContext::load(&package).unwrap();
    assert_eq!(context.shared_strings.len(), 1);

    let out = tempdir().unwrap();
    convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();
    assert_eq!(read(out.path(), "Only.csv"), "resolved\n");
}

#[test]
fn test_missing_workbook_part() {
    let bytes = zip_parts([("docProps/app.xml", "<Properties/>")]);
    let err = Package::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, XlsxCsvError::InvalidFormat(_)));
}

#[test]
fn test_unresolvable_sheet_relationship() {
    let bytes = zip_parts([
        (
            "xl/workbook.xml",
            r#"<workbook><sheets><sheet name="Chart" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/></Relationships>"#,
        ),
    ]);
    let package = Package::from_bytes(bytes).unwrap();
    let out = tempdir().unwrap();

    let report = convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Continue,
    )
    .unwrap();
    match report.sheets[0].error() {
        Some(XlsxCsvError::Sheet { sheet, source }) => {
            assert_eq!(sheet, "Chart");
            assert!(matches!(**source, XlsxCsvError::InvalidFormat(_)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!out.path().join("Chart.csv").exists());
}

#[test]
fn test_workbook_without_relationships_uses_sheet_ids() {
    let bytes = zip_parts([
        (
            "xl/workbook.xml",
            r#"<workbook><sheets><sheet name="Legacy" sheetId="2" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/worksheets/sheet2.xml",
            r#"<worksheet><dimension ref="A1:B1"/><sheetData><row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c></row></sheetData></worksheet>"#,
        ),
    ]);
    let package = Package::from_bytes(bytes).unwrap();
    let out = tempdir().unwrap();

    convert_workbook(
        &package,
        &SheetSelection::default(),
        ConvertOptions::default(),
        out.path(),
        FailurePolicy::Abort,
    )
    .unwrap();
    assert_eq!(read(out.path(), "Legacy.csv"), "1,2\n");
}
