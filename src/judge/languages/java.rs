//! Java language handler

use super::{default_env, CompileTemplate, LanguageHandler, RunTemplate, SeccompRule};
use crate::constants::languages;

/// Get handler for Java
///
/// The JVM reserves far more address space than it touches, so the sandbox
/// only checks peak memory after the run instead of capping it.
pub fn handler() -> LanguageHandler {
    LanguageHandler {
        name: languages::JAVA,
        compile: Some(CompileTemplate {
            src_name: "Main.java",
            exe_name: "Main",
            max_cpu_time: 5000,
            max_real_time: 10000,
            max_memory: -1,
            command: "/usr/bin/javac {src_path} -d {exe_dir} -encoding UTF8",
        }),
        run: RunTemplate {
            command: "/usr/bin/java -cp {exe_dir} -XX:MaxRAM={max_memory}k -Djava.security.manager -Dfile.encoding=UTF-8 -Djava.security.policy==/etc/java_policy -Djava.awt.headless=true Main",
            seccomp_rule: SeccompRule::Unrestricted,
            env: default_env(),
            memory_limit_check_only: true,
        },
        spj: None,
    }
}
