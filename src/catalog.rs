//! Inputs under test and the tools that minify them.
//!
//! The builtin tables describe the bundles checked into `third_party/` and
//! the minifiers installed under `node_modules/`. A catalog with the same
//! shape can also be loaded from JSON, which is how ad hoc tool sets are
//! benchmarked without touching the builtin tables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Identifier of the baseline tool every reduction is measured against.
pub const RAW_TOOL: &str = "raw";

/// A correctness test: a page root to serve and the test file to run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub webroot: String,
    pub test: String,
}

/// Describes one input bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsFileMetadata {
    pub bundle_path: String,
    pub desc: String,
    /// Project README; defaults to `README.md` alongside the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Externs needed by tools running in advanced mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub externs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestSpec>,
}

/// One way of invoking a tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Shell template with `%%in%%`, `%%out%%` and `%%externs%%`.
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub id: String,
    pub name: String,
    /// The first variant is the tool's default form.
    pub variants: Vec<Variant>,
}

/// Inputs keyed (and therefore iterated) by identifier, tools in
/// declaration order with `raw` first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub inputs: BTreeMap<String, JsFileMetadata>,
    pub tools: Vec<ToolMetadata>,
}

impl Catalog {
    /// Reads a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn input(&self, id: &str) -> Result<&JsFileMetadata> {
        self.inputs
            .get(id)
            .ok_or_else(|| Error::UnknownInput(id.to_string()))
    }

    pub fn tool(&self, id: &str) -> Option<&ToolMetadata> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// The tables shipped with the benchmark.
    ///
    /// `root` is the project directory; the Closure Compiler binary is
    /// resolved against it, so glossary commands need redacting later.
    pub fn builtin(root: &Path) -> Self {
        let inputs = INPUTS
            .iter()
            .map(|def| (def.id.to_string(), def.to_metadata()))
            .collect();

        let closure = closure_command(root);
        let tools = vec![
            tool(
                RAW_TOOL,
                "baseline input file",
                vec![variant(None, None, "cp %%in%% %%out%%")],
            ),
            tool(
                "uglify",
                "uglifyjs 3.5.6",
                vec![
                    variant(None, None, "node_modules/.bin/uglifyjs %%in%% -o %%out%%"),
                    variant(
                        Some("compress-mangle"),
                        Some("<tt>--compress</tt> and <tt>--mangle</tt> flags"),
                        "node_modules/.bin/uglifyjs %%in%% -o %%out%% --compress --mangle",
                    ),
                ],
            ),
            tool(
                "terser",
                "terser 3.17.0",
                vec![
                    variant(None, None, "node_modules/.bin/terser %%in%% -o %%out%%"),
                    variant(
                        Some("compress-mangle"),
                        Some("<tt>--compress</tt> and <tt>--mangle</tt> flags"),
                        "node_modules/.bin/terser %%in%% -o %%out%% --compress --mangle",
                    ),
                ],
            ),
            tool(
                "closure",
                "<a href='https://developers.google.com/closure/compiler/'>Google Closure Compiler</a> 20190415",
                vec![
                    variant(
                        None,
                        None,
                        &format!("{closure} --js_output_file=%%out%% %%in%%"),
                    ),
                    variant(
                        Some("advanced"),
                        Some("advanced mode + externs"),
                        &format!(
                            "{closure} -O advanced third_party/externs.js %%externs%% --js_output_file=%%out%% %%in%%"
                        ),
                    ),
                ],
            ),
        ];

        Self { inputs, tools }
    }
}

struct InputDef {
    id: &'static str,
    bundle_path: &'static str,
    desc: &'static str,
    readme: Option<&'static str>,
    version: Option<&'static str>,
    transform: Option<&'static str>,
    externs: Option<&'static str>,
    test: Option<(&'static str, &'static str)>,
}

impl InputDef {
    fn to_metadata(&self) -> JsFileMetadata {
        JsFileMetadata {
            bundle_path: self.bundle_path.to_string(),
            desc: self.desc.to_string(),
            readme: self.readme.map(str::to_string),
            version: self.version.map(str::to_string),
            transform: self.transform.map(str::to_string),
            externs: self.externs.map(str::to_string),
            test: self.test.map(|(webroot, test)| TestSpec {
                webroot: webroot.to_string(),
                test: test.to_string(),
            }),
        }
    }
}

const PLAIN: InputDef = InputDef {
    id: "",
    bundle_path: "",
    desc: "",
    readme: None,
    version: None,
    transform: None,
    externs: None,
    test: None,
};

static INPUTS: &[InputDef] = &[
    InputDef {
        id: "angularjs",
        bundle_path: "third_party/angularjs/angular.js",
        desc: "angularjs 1.6.6 minified bundle",
        version: Some("1.6.6"),
        ..PLAIN
    },
    InputDef {
        id: "fake-10mb-angular",
        bundle_path: "fake-10mb-angular.js",
        desc: "angularjs 1.6.6 minified, artificially repeated until input file >10mb",
        version: Some("1.6.6"),
        transform: Some(crate::transform::ANGULAR_10X),
        ..PLAIN
    },
    InputDef {
        id: "angular-hello",
        bundle_path: "third_party/angular/main.js",
        desc: "angular5 + cli hello world \
               (note: <a href=\"https://github.com/angular/closure-demo\">closure-optimized build</a> is much smaller)",
        ..PLAIN
    },
    InputDef {
        id: "react",
        bundle_path: "third_party/react/react.production.min.js",
        desc: "react production bundle",
        ..PLAIN
    },
    InputDef {
        id: "react-dom",
        bundle_path: "third_party/react/react-dom.production.min.js",
        desc: "react-dom production bundle",
        ..PLAIN
    },
    InputDef {
        id: "vue",
        bundle_path: "third_party/vue/vue.js",
        desc: "vue.js 2.5.3",
        version: Some("2.5.3"),
        ..PLAIN
    },
    InputDef {
        id: "todomvc-vanillajs",
        bundle_path: "third_party/todomvc/vanillajs/bundle.js",
        desc: "todomvc vanillajs",
        readme: Some("third_party/todomvc/README.md"),
        externs: Some("third_party/todomvc/vanillajs/externs.js"),
        test: Some((
            "third_party/todomvc/vanillajs",
            "out/third_party/todomvc/test.js",
        )),
        ..PLAIN
    },
    InputDef {
        id: "todomvc-react",
        bundle_path: "third_party/todomvc/react/bundle.js",
        desc: "todomvc react",
        readme: Some("third_party/todomvc/README.md"),
        externs: Some("third_party/todomvc/react/externs.js"),
        test: Some(("third_party/todomvc/react", "out/third_party/todomvc/test.js")),
        ..PLAIN
    },
];

fn closure_command(root: &Path) -> String {
    let package = if cfg!(target_os = "macos") {
        "google-closure-compiler-osx"
    } else {
        "google-closure-compiler-linux"
    };
    let binary = root.join("node_modules").join(package).join("compiler");
    [
        binary.to_string_lossy().as_ref(),
        "--jscomp_off checkVars",
        "--warning_level QUIET",
        "--language_in ES_NEXT",
        "--language_out ECMASCRIPT_2015",
        "--isolation_mode IIFE",
        "--assume_function_wrapper",
        "--strict_mode_input",
    ]
    .join(" ")
}

fn tool(id: &str, name: &str, variants: Vec<Variant>) -> ToolMetadata {
    ToolMetadata {
        id: id.to_string(),
        name: name.to_string(),
        variants,
    }
}

fn variant(id: Option<&str>, desc: Option<&str>, command: &str) -> Variant {
    Variant {
        id: id.map(str::to_string),
        desc: desc.map(str::to_string),
        command: command.to_string(),
    }
}
