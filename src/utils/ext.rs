/// Normalised extension for the files the scanner parses.
pub fn lowercase_ext(path: &std::path::Path) -> Option<&'static str> {
    path.extension().and_then(|s| match s.to_str()? {
        "py" | "PY" | "Py" => Some("py"),
        "pyw" | "PYW" => Some("pyw"),
        "pyi" | "PYI" => Some("pyi"),
        _ => None,
    })
}

#[test]
fn lowercase_ext_recognises_python_sources() {
    let cases = [
        ("app.py", Some("py")),
        ("SETUP.PY", Some("py")),
        ("gui.pyw", Some("pyw")),
        ("stubs.pyi", Some("pyi")),
        // bytecode
        ("module.pyc", None),
        ("README", None),
    ];

    for (file, expected) in cases {
        assert_eq!(lowercase_ext(std::path::Path::new(file)), expected, "case: {file}");
    }
}
