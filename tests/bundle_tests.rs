use pyblocks_core::bundle::{read_bundle, write_bundle, Project};
use pyblocks_core::custom::{program_source, register_custom_block, CustomBlockDefinition};
use pyblocks_core::emit::{workspace_to_code, EmitOptions};
use pyblocks_core::imports::parse_descriptors;
use pyblocks_core::registry::BlockRegistry;
use pyblocks_core::workspace::Workspace;
use pyblocks_core::xml::text_to_graph;
use tempfile::tempdir;

#[test]
fn test_bundle_round_trip() {
    let definition: CustomBlockDefinition = serde_json::from_str(
        r#"{"name": "greet", "params": ["who"], "body_code": "print(who)",
            "description": "Say hello"}"#,
    )
    .unwrap();
    let mut registry = BlockRegistry::with_builtins();
    let [call_id, _] = register_custom_block(&mut registry, &definition);

    let mut ws = Workspace::new();
    let import = ws.add_block("python_import");
    ws.set_field(import, "MODULE", "json").unwrap();
    ws.set_position(import, 10, 10).unwrap();
    let call = ws.add_block(call_id.as_str());
    ws.set_field(call, "ARGS", "'bob'").unwrap();
    ws.connect_next(&registry, import, call).unwrap();

    let options = EmitOptions::default();
    let code = workspace_to_code(&registry, &ws, &options).unwrap();
    let source = program_source(&[definition.clone()], &code, &options);
    let imports =
        parse_descriptors(r#"[{"name": "json", "functions": [{"name": "dumps"}]}]"#).unwrap();
    let project = Project::new(&ws, &registry, vec![definition], imports, source).unwrap();
    assert_eq!(project.block_count, 2);

    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("demo.pyblocks");
    write_bundle(&project, &path).unwrap();
    let loaded = read_bundle(&path).unwrap();
    assert_eq!(loaded, project);
    assert_eq!(
        loaded.source,
        "def greet(who):\n  print(who)\n\nimport json\ngreet('bob')\n"
    );

    let reloaded = text_to_graph(&loaded.workspace_xml).unwrap();
    assert_eq!(workspace_to_code(&registry, &reloaded, &options).unwrap(), code);
}

#[test]
fn test_bundle_rejects_plain_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fake.pyblocks");
    std::fs::write(&path, "<xml/>").unwrap();
    let err = read_bundle(&path).unwrap_err();
    assert!(err.to_string().contains("not a valid .pyblocks archive"));
}
