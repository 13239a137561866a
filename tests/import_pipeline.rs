// End-to-end import scenarios against an in-memory SQLite store

use poi_import::{
    admin, get_extractor, normalize, ImportError, ImportOptions, ImportService, ImportStats,
    SourceKind, SqliteStore,
};
use std::io::Write;
use std::path::PathBuf;

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_single_csv_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "pois.csv",
        "poi_id,poi_name,poi_latitude,poi_longitude,poi_category,poi_ratings\n\
         E1,Park,1.1,2.2,park,\"4,5\"\n",
    );

    let store = SqliteStore::open_in_memory().unwrap();
    let service = ImportService::new(&store, &store, ImportOptions::new(5, 5).unwrap());

    let stats = service.run(&[&path]).unwrap();
    assert_eq!(
        stats,
        ImportStats {
            files_processed: 1,
            created: 1,
            updated: 0
        }
    );

    let poi = store.get_poi("E1").unwrap().unwrap();
    assert_eq!(poi.name, "Park");
    assert_eq!(poi.ratings, vec![4.0, 5.0]);
    assert_eq!(poi.avg_rating(), Some(4.5));

    let history = admin::list_imports(&store, None, 1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, SourceKind::Tabular);
    assert_eq!(history[0].filename, "pois.csv");
}

#[test]
fn test_reimport_updates_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from(
        "poi_id,poi_name,poi_latitude,poi_longitude,poi_category,poi_ratings,poi_description\n",
    );
    for i in 0..25 {
        let rating = i % 6;
        csv.push_str(&format!("P{i},Place {i},{i}.5,-{i}.25,cafe,\"[{rating}, 4]\",desc {i}\n"));
    }
    let path = write_fixture(&dir, "pois.csv", &csv);

    let store = SqliteStore::open_in_memory().unwrap();
    let service = ImportService::new(&store, &store, ImportOptions::new(7, 3).unwrap());

    let first = service.run(&[&path]).unwrap();
    assert_eq!((first.created, first.updated), (25, 0));

    let ids_before: Vec<String> = (0..25)
        .map(|i| store.get_poi(&format!("P{i}")).unwrap().unwrap().id)
        .collect();

    let second = service.run(&[&path]).unwrap();
    assert_eq!((second.created, second.updated), (0, 25));
    assert_eq!(store.count_pois().unwrap(), 25);

    let ids_after: Vec<String> = (0..25)
        .map(|i| store.get_poi(&format!("P{i}")).unwrap().unwrap().id)
        .collect();
    assert_eq!(ids_before, ids_after);
    assert_eq!(admin::list_imports(&store, None, 1).unwrap().len(), 2);
}

#[test]
fn test_markup_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "pois.xml",
        r#"<?xml version="1.0"?>
        <root>
          <poi>
            <pid>X1</pid>
            <pname>
                Old Town Square
            </pname>
            <platitude>50.087</platitude>
            <plongitude>14.421</plongitude>
            <pcategory>square</pcategory>
            <pratings>4.5;5</pratings>
          </poi>
          <poi>
            <pid>X2</pid>
            <pname> Charles Bridge </pname>
            <platitude>50.086</platitude>
            <plongitude>14.411</plongitude>
            <pcategory>bridge</pcategory>
            <pratings>[5, 4.75]</pratings>
            <pdescription>Stone bridge</pdescription>
          </poi>
          <notes><pid>not a record</pid></notes>
        </root>"#,
    );

    let extractor = get_extractor(SourceKind::Markup);
    let records: Vec<_> = extractor
        .extract(&path, 10)
        .unwrap()
        .flat_map(|group| group.unwrap())
        .map(|row| normalize(&row, SourceKind::Markup).unwrap())
        .collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "Old Town Square");
    assert_eq!(records[1].name, "Charles Bridge");
    assert_eq!(records[1].ratings, vec![5.0, 4.75]);
    assert_eq!(records[1].description, "Stone bridge");

    let store = SqliteStore::open_in_memory().unwrap();
    let service = ImportService::new(&store, &store, ImportOptions::default());
    let stats = service.run(&[&path]).unwrap();
    assert_eq!((stats.files_processed, stats.created), (1, 2));
}

#[test]
fn test_structured_document_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "pois.json",
        r#"[
  {"id": 1, "name": "Museu", "coordinates": [10.0, 20.0], "category": "Cultura", "ratings": "4.0"},
  {"id": 2, "name": "Parque", "coordinates": {"latitude": 1, "longitude": 2}, "category": "Lazer"}
]"#,
    );

    let store = SqliteStore::open_in_memory().unwrap();
    let service = ImportService::new(&store, &store, ImportOptions::new(1, 1).unwrap());
    let stats = service.run(&[&path]).unwrap();
    assert_eq!((stats.created, stats.updated), (2, 0));

    let parque = store.get_poi("2").unwrap().unwrap();
    assert_eq!((parque.latitude, parque.longitude), (1.0, 2.0));
    assert!(parque.ratings.is_empty());
}

#[test]
fn test_nonexistent_path_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_fixture(
        &dir,
        "good.csv",
        "poi_id,poi_name,poi_latitude,poi_longitude,poi_category,poi_ratings\nE1,Park,1,2,park,4\n",
    );
    let missing = dir.path().join("nope.csv");

    let store = SqliteStore::open_in_memory().unwrap();
    let service = ImportService::new(&store, &store, ImportOptions::default());

    let err = service.run(&[&good, &missing]).unwrap_err();
    assert_eq!(err.path, missing);
    assert!(matches!(err.source, ImportError::FileNotFound(_)));
    assert!(err.to_string().starts_with("failed processing"));
}

#[test]
fn test_boolean_and_nan_ratings_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "pois.json",
        "{\"id\": \"B1\", \"name\": \"Pier\", \"coordinates\": [1, 2], \"category\": \"pier\", \
         \"ratings\": true}\n\
         {\"id\": \"B2\", \"name\": \"Dock\", \"coordinates\": [3, 4], \"category\": \"pier\", \
         \"ratings\": \"nan;0.125\"}\n",
    );

    let store = SqliteStore::open_in_memory().unwrap();
    let service = ImportService::new(&store, &store, ImportOptions::default());
    let stats = service.run(&[&path]).unwrap();
    assert_eq!((stats.created, stats.updated), (2, 0));

    assert_eq!(store.get_poi("B1").unwrap().unwrap().ratings, vec![1.0]);
    assert_eq!(store.get_poi("B2").unwrap().unwrap().ratings, vec![0.0, 0.12]);
}
