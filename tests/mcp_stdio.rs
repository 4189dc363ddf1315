use std::path::{Path, PathBuf};

use aventine::{
    DataDir,
    DocumentKey,
    Indexer,
    Lexicon,
    Providers,
    Settings,
    pipeline::Quiet,
};
use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

fn setup_fixture(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = DataDir::resolve(Some(root))?;
    std::fs::create_dir_all(data_dir.metadata_dir())?;

    let key = DocumentKey::parse("carmina")?;
    std::fs::write(data_dir.text_file(&key), "odi et amo\namor vincit omnia\n")?;
    std::fs::write(
        data_dir.metadata_file(&key),
        serde_json::to_vec(&json!({
            "key": "carmina",
            "title": "Carmina",
            "index": ["85", "86"],
            "length": 2,
            "text_id": "1999.02.0003",
            "schema": "Catul.+{}"
        }))?,
    )?;

    // Same providers the binary builds when nothing is configured.
    let settings = Settings::default();
    let indexer = Indexer::new(
        data_dir,
        Lexicon::new(settings.key_scheme),
        Providers::from_settings(&settings)?,
    );
    indexer.index_source(&key, &mut Quiet)?;
    Ok(())
}

fn call(
    name: &str,
    args: serde_json::Value,
) -> CallToolRequestParams {
    let mut params = CallToolRequestParams::new(name.to_string());
    params.arguments = args.as_object().cloned();
    params
}

#[tokio::test]
async fn mcp_stdio_search_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = aventine_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp")
                .env("AVENTINE_DATA_DIR", tempdir.path())
                .env_remove("AVENTINE_ANNOTATOR")
                .env_remove("AVENTINE_GLOSSARY")
                .env_remove("AVENTINE_SOURCE_VECTORS")
                .env_remove("AVENTINE_DIMENSION")
                .env_remove("AVENTINE_KEY_SCHEME");
        }),
    )?;

    let client = ().serve(transport).await?;

    let result = client
        .peer()
        .call_tool(call(
            "aventine_search",
            json!({ "query": "amo", "language": "source", "limit": 10 }),
        ))
        .await?;
    assert_eq!(result.is_error, Some(false));

    let structured = result.structured_content.expect("structured content");
    assert_eq!(structured["language"], "source");
    let results = structured
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array");
    assert!(!results.is_empty());

    let lemmata: Vec<&str> = results
        .iter()
        .filter_map(|hit| hit.get("lemma").and_then(|v| v.as_str()))
        .collect();
    assert!(lemmata.iter().all(|lemma| !lemma.starts_with("amo ")));

    let vincit = results
        .iter()
        .find(|hit| {
            hit.get("lemma")
                .and_then(|v| v.as_str())
                .is_some_and(|lemma| lemma.starts_with("vincit"))
        })
        .expect("vincit hit");
    let citation = &vincit["locations"]["carmina"][0];
    assert_eq!(citation["citation"], "86");
    assert_eq!(
        citation["url"],
        "https://www.perseus.tufts.edu/hopper/text?doc=Catul.+86\
         &fromdoc=Perseus:text:1999.02.0003"
    );

    let bad = client
        .peer()
        .call_tool(call(
            "aventine_search",
            json!({ "query": "amo", "language": "greek" }),
        ))
        .await?;
    assert_eq!(bad.is_error, Some(true));

    client.cancel().await?;
    Ok(())
}

fn aventine_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_aventine") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("aventine");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
