mod tests {
    use crate::*;

    #[test]
    fn test_cli_args_defaults() {
        let args = CliArgs::try_parse_from(["casegen"]).expect("should parse");
        let config = resolve_config(&args).expect("config");
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_cli_args_flags_override() {
        let args = CliArgs::try_parse_from([
            "casegen",
            "a.json",
            "b.yaml",
            "-o",
            "out/cases.c.h",
            "-l",
            "--jobs",
            "3",
            "--strict-families",
        ])
        .expect("should parse");
        let config = resolve_config(&args).expect("config");
        assert_eq!(config.input_paths, vec![PathBuf::from("a.json"), PathBuf::from("b.yaml")]);
        assert_eq!(config.output_path, PathBuf::from("out/cases.c.h"));
        assert!(config.emit_positions);
        assert_eq!(config.jobs, 3);
        assert!(config.strict_families);
    }

    #[test]
    fn test_cli_args_reject_bad_values() {
        assert!(CliArgs::try_parse_from(["casegen", "--jobs", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["casegen", "--jobs", "many"]).is_err());
        assert!(CliArgs::try_parse_from(["casegen", "-o", " "]).is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("casegen.toml");
        std::fs::write(&path, "input_paths = [\"defs.json\"]\njobs = 8\nemit_positions = true\n").expect("write");

        let path_arg = path.display().to_string();
        let args = CliArgs::try_parse_from(["casegen", "--config", path_arg.as_str(), "-j", "2"]).expect("should parse");
        let config = resolve_config(&args).expect("config");
        assert_eq!(config.input_paths, vec![dir.path().join("defs.json")]);
        assert_eq!(config.jobs, 2);
        assert!(config.emit_positions);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = CliArgs::try_parse_from(["casegen", "--config", "does/not/exist.toml"]).expect("should parse");
        let err = resolve_config(&args).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_filter_expr_from() {
        assert_eq!(filter_expr_from("  "), None);
        assert_eq!(filter_expr_from(" casegen_core=trace "), Some("casegen_core=trace".to_string()));
    }
}
