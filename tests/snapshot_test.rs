mod common;

use std::fs;

use partclass::pipeline;
use partclass::{RuntimeConfig, SnapshotError, SnapshotStore, Split};

#[test]
fn test_reload_gives_identical_predictions() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let tmp = tempfile::tempdir()?;
    let output = pipeline::train(&common::dataset(15), &common::quick_config())?;

    let store = SnapshotStore::new(tmp.path())?;
    store.write(&output.classifier, &output.data.dataset)?;
    let reloaded = store.load(&RuntimeConfig::default())?;

    assert_eq!(reloaded.vocabulary(), output.classifier.vocabulary());
    assert_eq!(reloaded.model_config(), output.classifier.model_config());
    for text in ["SN74LVC101APWR", "595-SN74LVC101A", "296-8501-1-ND"] {
        let before = output.classifier.predict(text)?;
        let after = reloaded.predict(text)?;
        assert_eq!(before.label, after.label);
        for (a, b) in before.probabilities.iter().zip(after.probabilities.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
    Ok(())
}

#[test]
fn test_dataset_snapshot_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let tmp = tempfile::tempdir()?;
    let output = pipeline::train(&common::dataset(10), &common::quick_config())?;

    let store = SnapshotStore::new(tmp.path())?;
    store.write(&output.classifier, &output.data.dataset)?;
    let dataset = store.load_dataset()?;

    assert_eq!(dataset, output.data.dataset);
    let train = dataset.encoded(Split::Train)?;
    assert_eq!(train.sequences.ncols(), dataset.sequence_length);
    Ok(())
}

#[test]
fn test_architecture_file_describes_layers() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let tmp = tempfile::tempdir()?;
    let output = pipeline::train(&common::dataset(10), &common::quick_config())?;
    let store = SnapshotStore::new(tmp.path())?;
    store.write(&output.classifier, &output.data.dataset)?;

    let json: serde_json::Value = serde_json::from_slice(&fs::read(store.architecture_path())?)?;
    let layers = json["layers"].as_array().unwrap();
    let kinds: Vec<&str> = layers.iter().map(|l| l["kind"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["Embedding", "LSTM", "Dense(softmax)"]);
    assert_eq!(
        json["model"]["sequence_length"].as_u64().unwrap() as usize,
        output.classifier.sequence_length()
    );
    Ok(())
}

#[test]
fn test_tampered_snapshot_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let tmp = tempfile::tempdir()?;
    let output = pipeline::train(&common::dataset(10), &common::quick_config())?;
    let store = SnapshotStore::new(tmp.path())?;
    store.write(&output.classifier, &output.data.dataset)?;
    assert!(store.verify()?);

    fs::write(store.vocabulary_path(), r#"{"A": 1}"#)?;
    assert!(!store.verify()?);
    assert!(matches!(
        store.load(&RuntimeConfig::default()),
        Err(SnapshotError::HashMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_remove_deletes_all_artifacts() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let tmp = tempfile::tempdir()?;
    let output = pipeline::train(&common::dataset(10), &common::quick_config())?;
    let store = SnapshotStore::new(tmp.path())?;
    store.write(&output.classifier, &output.data.dataset)?;

    store.remove()?;
    assert!(!store.exists());
    assert!(!store.weights_path().exists());
    assert!(matches!(store.load_dataset(), Err(SnapshotError::Missing(_))));
    Ok(())
}
