//! C++ language handler

use super::{c_cpp_seccomp, c_family_spj, default_env, CompileTemplate, LanguageHandler, RunTemplate};
use crate::constants::languages;

const GXX: &str =
    "/usr/bin/g++ -DONLINE_JUDGE -O2 -w -fmax-errors=3 -std=c++20 {src_path} -lm -o {exe_path}";

/// Get handler for C++
pub fn handler() -> LanguageHandler {
    LanguageHandler {
        name: languages::CPP,
        compile: Some(CompileTemplate {
            src_name: "main.cpp",
            exe_name: "main",
            max_cpu_time: 10000,
            max_real_time: 20000,
            max_memory: 1024 * 1024 * 1024,
            command: GXX,
        }),
        run: RunTemplate {
            command: "{exe_path}",
            seccomp_rule: c_cpp_seccomp(),
            env: default_env(),
            memory_limit_check_only: false,
        },
        spj: Some(c_family_spj("spj-{spj_version}.cpp", GXX)),
    }
}
