//! Group a small delivery log by driver and day, then toggle groups.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_grouping

use location_grouper::{count, CellValue, RawSheet, SelectionLevel, Session, View};

fn row(timestamp: &str, lat: f64, lng: f64, driver: &str, day: f64) -> Vec<CellValue> {
    vec![
        timestamp.into(),
        CellValue::Number(lat),
        CellValue::Number(lng),
        driver.into(),
        CellValue::Number(day),
    ]
}

fn main() {
    env_logger::init();

    // Delivery days stored as spreadsheet serial numbers (Seoul area)
    let sheet = RawSheet::new(
        "deliveries",
        vec![
            vec![
                "TS_Local".into(),
                "Latitude".into(),
                "Longitude".into(),
                "driver".into(),
                "delivery_date".into(),
            ],
            row("2024-01-15 09:00:00", 37.5665, 126.9780, "kim", 45306.0),
            row("2024-01-15 09:36:00", 37.5700, 126.9820, "kim", 45306.0),
            row("2024-01-16 09:07:00", 37.5759, 126.9768, "kim", 45307.0),
            row("2024-01-15 09:21:00", 37.4979, 127.0276, "lee", 45306.0),
            row("2024-01-15 10:04:00", 37.5045, 127.0490, "lee", 45306.0),
        ],
    );

    let mut session = Session::default();
    session.load(vec![sheet]);

    for summary in session.sheet_summaries() {
        println!(
            "{} ({} rows, {:.2} km)",
            summary.name, summary.row_count, summary.distance_km
        );
    }
    println!("Columns: {:?}\n", session.all_columns());

    session.set_group_columns(vec!["driver".to_string(), "delivery_date".to_string()]);
    print_groups(&mut session);

    println!("\nHiding kim|2024-01-16 ...\n");
    session.toggle_group("kim|2024-01-16");
    print_groups(&mut session);
}

fn print_groups(session: &mut Session) {
    let view = match session.render() {
        View::Groups(view) => view,
        View::Sheets { .. } => return,
    };

    for (driver, node) in view.tree.iter() {
        let level = match session.selection().selection_level(&view.tree, driver) {
            SelectionLevel::All => "[x]",
            SelectionLevel::Some => "[-]",
            SelectionLevel::None => "[ ]",
        };
        println!("{} {} ({} points)", level, driver, count(node));
        for key in view.tree.child_keys(Some(driver)) {
            let mark = if session.selection().is_group_selected(&key) { "[x]" } else { "[ ]" };
            let size = view.tree.get(&key).map(count).unwrap_or(0);
            println!("    {} {} ({} points)", mark, key, size);
        }
    }

    for track in &view.tracks {
        println!("\n{}:", track.key);
        for record in &track.records {
            println!("  {}  {:.4}, {:.4}", record.timestamp, record.lat, record.lng);
        }
        for segment in track.path_segments() {
            match segment.speed_kmh {
                Some(speed) => println!("  -> {:.2} km at {:.1} km/h", segment.distance_km, speed),
                None => println!("  -> {:.2} km", segment.distance_km),
            }
        }
    }
    println!("\n{} connectors between groups", view.connectors.len());
}
