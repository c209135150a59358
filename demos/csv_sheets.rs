//! Load a CSV export holding two logs and show each as a sheet track.
//!
//! Run with: RUST_LOG=info cargo run --example csv_sheets

use location_grouper::{Session, View};

const EXPORT: &str = "\
날짜,시간,위도,경도,메모
2024-01-15,08:00:00,37.5665,126.9780,출발
2024-01-15,08:20:00,37.5512,126.9882,
2024-01-15,08:45:00,37.5172,127.0473,도착

timestamp,lat,lng
2024-01-15T09:00:00+09:00,35.1796,129.0756
2024-01-15T09:30:00+09:00,35.1587,129.1604
2024-01-15T10:00:00+09:00,not recorded,129.2000
";

fn main() {
    env_logger::init();

    let mut session = Session::default();
    match session.load_csv(EXPORT.as_bytes()) {
        Ok(n) => println!("Loaded {} sheets", n),
        Err(e) => {
            eprintln!("Failed to read CSV: {}", e);
            return;
        }
    }

    for summary in session.sheet_summaries() {
        println!("  {} ({} rows, {:.2} km)", summary.name, summary.row_count, summary.distance_km);
    }

    session.toggle_sheet("Sheet2");
    let view = session.render();

    if let View::Sheets { tracks, issues, .. } = &view {
        for track in tracks {
            println!("\n{}:", track.sheet_name);
            for record in &track.records {
                let details: Vec<String> = record
                    .fields()
                    .map(|(header, value)| format!("{}={}", header, value))
                    .collect();
                println!("  row {}: {}", record.row_index, details.join(", "));
            }
        }
        for issue in issues {
            println!("\nSkipped: {}", issue);
        }
    }
    println!("\n{} points visible", view.record_count());
}
