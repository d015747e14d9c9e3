//! Language configuration table
//!
//! Static compile/run descriptors sent to the sandbox with every judge
//! request, plus the special-judge descriptors for languages that can be
//! used to write a checker.

pub mod c;
pub mod cpp;
pub mod go;
pub mod java;
pub mod javascript;
pub mod python;

use serde::Serialize;

use crate::{
    constants,
    error::{AppError, AppResult},
    models::IoMode,
};

/// Placeholder substituted into special-judge file names
const SPJ_VERSION_PLACEHOLDER: &str = "{spj_version}";

/// Locale every sandboxed process runs with
fn default_env() -> Vec<&'static str> {
    vec!["LANG=en_US.UTF-8", "LANGUAGE=en_US:en", "LC_ALL=en_US.UTF-8"]
}

/// Compile step as the sandbox expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileConfig {
    pub src_name: String,
    pub exe_name: String,
    pub max_cpu_time: i64,
    pub max_real_time: i64,
    pub max_memory: i64,
    pub compile_command: String,
}

/// Run step as the sandbox expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub command: String,
    pub seccomp_rule: Option<String>,
    pub env: Vec<String>,
    pub memory_limit_check_only: i32,
}

/// `language_config` field of a judge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileConfig>,
    pub run: RunConfig,
}

/// How the special judge is invoked per test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpjRunConfig {
    pub exe_name: String,
    pub command: String,
    pub seccomp_rule: String,
}

/// Seccomp profile for the run step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeccompRule {
    Unrestricted,
    Fixed(&'static str),
    /// Profile depends on whether the problem reads files
    ByIoMode {
        standard: &'static str,
        file: &'static str,
    },
}

impl SeccompRule {
    pub fn resolve(&self, io_mode: &IoMode) -> Option<String> {
        match self {
            Self::Unrestricted => None,
            Self::Fixed(rule) => Some((*rule).to_string()),
            Self::ByIoMode { standard, file } => Some(if io_mode.is_file_io() {
                (*file).to_string()
            } else {
                (*standard).to_string()
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct CompileTemplate {
    src_name: &'static str,
    exe_name: &'static str,
    max_cpu_time: i64,
    max_real_time: i64,
    max_memory: i64,
    command: &'static str,
}

impl CompileTemplate {
    fn render(&self, spj_version: Option<&str>) -> CompileConfig {
        let version = spj_version.unwrap_or_default();
        CompileConfig {
            src_name: self.src_name.replace(SPJ_VERSION_PLACEHOLDER, version),
            exe_name: self.exe_name.replace(SPJ_VERSION_PLACEHOLDER, version),
            max_cpu_time: self.max_cpu_time,
            max_real_time: self.max_real_time,
            max_memory: self.max_memory,
            compile_command: self.command.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct RunTemplate {
    command: &'static str,
    seccomp_rule: SeccompRule,
    env: Vec<&'static str>,
    memory_limit_check_only: bool,
}

#[derive(Debug, Clone)]
struct SpjTemplate {
    compile: CompileTemplate,
    exe_name: &'static str,
    command: &'static str,
    seccomp_rule: &'static str,
}

/// Language handler: descriptors for one submission language
#[derive(Debug, Clone)]
pub struct LanguageHandler {
    name: &'static str,
    compile: Option<CompileTemplate>,
    run: RunTemplate,
    spj: Option<SpjTemplate>,
}

impl LanguageHandler {
    /// Get handler for a specific language
    pub fn for_language(language: &str) -> AppResult<Self> {
        match language {
            constants::languages::C => Ok(c::handler()),
            constants::languages::CPP => Ok(cpp::handler()),
            constants::languages::JAVA => Ok(java::handler()),
            constants::languages::PYTHON2 => Ok(python::python2()),
            constants::languages::PYTHON3 => Ok(python::python3()),
            constants::languages::GO => Ok(go::handler()),
            constants::languages::JAVASCRIPT => Ok(javascript::handler()),
            _ => Err(AppError::Validation(format!(
                "Unsupported language: {}",
                language
            ))),
        }
    }

    /// Get handler for a language used to write a special judge
    pub fn for_spj(language: &str) -> AppResult<Self> {
        let handler = Self::for_language(language)?;
        if handler.spj.is_none() {
            return Err(AppError::Validation(format!(
                "Language {} cannot be used for a special judge",
                language
            )));
        }
        Ok(handler)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the sandbox must compile the submission before running it
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Descriptor sent as `language_config` for a problem with `io_mode`
    pub fn language_config(&self, io_mode: &IoMode) -> LanguageConfig {
        LanguageConfig {
            compile: self.compile.as_ref().map(|c| c.render(None)),
            run: RunConfig {
                command: self.run.command.to_string(),
                seccomp_rule: self.run.seccomp_rule.resolve(io_mode),
                env: self.run.env.iter().map(|e| e.to_string()).collect(),
                memory_limit_check_only: i32::from(self.run.memory_limit_check_only),
            },
        }
    }

    /// Special-judge compile descriptor for `spj_version`
    pub fn spj_compile_config(&self, spj_version: &str) -> Option<CompileConfig> {
        self.spj
            .as_ref()
            .map(|spj| spj.compile.render(Some(spj_version)))
    }

    /// Special-judge run descriptor for `spj_version`
    pub fn spj_run_config(&self, spj_version: &str) -> Option<SpjRunConfig> {
        self.spj.as_ref().map(|spj| SpjRunConfig {
            exe_name: spj.exe_name.replace(SPJ_VERSION_PLACEHOLDER, spj_version),
            command: spj.command.to_string(),
            seccomp_rule: spj.seccomp_rule.to_string(),
        })
    }
}

/// Seccomp rule shared by C and C++
fn c_cpp_seccomp() -> SeccompRule {
    SeccompRule::ByIoMode {
        standard: constants::seccomp_rules::C_CPP,
        file: constants::seccomp_rules::C_CPP_FILE_IO,
    }
}

/// Special judge descriptor shared by C and C++ checkers
fn c_family_spj(src_name: &'static str, command: &'static str) -> SpjTemplate {
    SpjTemplate {
        compile: CompileTemplate {
            src_name,
            exe_name: "spj-{spj_version}",
            max_cpu_time: 3000,
            max_real_time: 10000,
            max_memory: 1024 * 1024 * 1024,
            command,
        },
        exe_name: "spj-{spj_version}",
        command: "{exe_path} {in_file_path} {user_out_file_path}",
        seccomp_rule: constants::seccomp_rules::C_CPP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::io_modes;

    fn file_io() -> IoMode {
        IoMode {
            io_mode: io_modes::FILE.to_string(),
            ..IoMode::default()
        }
    }

    #[test]
    fn test_every_language_has_a_handler() {
        for language in constants::languages::ALL {
            let handler = LanguageHandler::for_language(language).unwrap();
            assert_eq!(handler.name(), *language);
        }
        assert!(LanguageHandler::for_language("Brainfuck").is_err());
    }

    #[test]
    fn test_seccomp_follows_io_mode() {
        let cpp = LanguageHandler::for_language("C++").unwrap();

        let standard = cpp.language_config(&IoMode::default());
        assert_eq!(standard.run.seccomp_rule.as_deref(), Some("c_cpp"));

        let file = cpp.language_config(&file_io());
        assert_eq!(file.run.seccomp_rule.as_deref(), Some("c_cpp_file_io"));

        let java = LanguageHandler::for_language("Java").unwrap();
        assert_eq!(java.language_config(&file_io()).run.seccomp_rule, None);
    }

    #[test]
    fn test_interpreted_language_has_no_compile_step() {
        let js = LanguageHandler::for_language("JavaScript").unwrap();
        assert!(!js.is_compiled());
        let json = serde_json::to_value(js.language_config(&IoMode::default())).unwrap();
        assert!(json.get("compile").is_none());
        assert_eq!(json["run"]["memory_limit_check_only"], 1);
    }

    #[test]
    fn test_spj_descriptors_carry_version() {
        let c = LanguageHandler::for_spj("C").unwrap();

        let compile = c.spj_compile_config("3f2a").unwrap();
        assert_eq!(compile.src_name, "spj-3f2a.c");
        assert_eq!(compile.exe_name, "spj-3f2a");

        let run = c.spj_run_config("3f2a").unwrap();
        assert_eq!(run.exe_name, "spj-3f2a");
        assert_eq!(run.seccomp_rule, "c_cpp");

        assert!(LanguageHandler::for_spj("Python3").is_err());
    }

    #[test]
    fn test_language_config_wire_shape() {
        let c = LanguageHandler::for_language("C").unwrap();
        let json = serde_json::to_value(c.language_config(&IoMode::default())).unwrap();

        assert_eq!(json["compile"]["src_name"], "main.c");
        assert_eq!(json["compile"]["max_memory"], 128 * 1024 * 1024);
        assert_eq!(json["run"]["command"], "{exe_path}");
        assert_eq!(json["run"]["env"][0], "LANG=en_US.UTF-8");
    }
}
