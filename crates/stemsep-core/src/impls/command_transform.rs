//! CommandTransform - 外部コマンドとして分離処理を起動する
//!
//! 既定では `python3 -m demucs.separate --mp3 -o <output> <input>` を実行し、
//! 出力は `<output>/<model>/<入力ファイル名の stem>/<part>.mp3` に並びます。
//! 入力ファイル名は `{id}.mp3` なので、ジョブの出力先は `<output>/<model>/{id}` です。

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::WorkerSettings;
use crate::domain::JobId;
use crate::ports::{Transform, TransformError};

/// 引数テンプレート中で置き換えるプレースホルダ
pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: String,
    args: Vec<String>,
    model: String,
}

impl CommandTransform {
    pub fn new(program: impl Into<String>, args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            model: model.into(),
        }
    }

    /// Demucs（htdemucs モデル, mp3 出力）
    pub fn demucs() -> Self {
        Self::new(
            "python3",
            ["-m", "demucs.separate", "--mp3", "-o", OUTPUT_PLACEHOLDER, INPUT_PLACEHOLDER]
                .into_iter()
                .map(String::from)
                .collect(),
            "htdemucs",
        )
    }

    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self::new(
            settings.transform_program.clone(),
            settings.transform_args.clone(),
            settings.transform_model.clone(),
        )
    }

    fn render_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn run(&self, input: &Path, output_dir: &Path) -> Result<(), TransformError> {
        let args = self.render_args(input, output_dir);
        tracing::debug!(program = %self.program, ?args, "spawning transform");

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(TransformError::Exit {
                code: status.code(),
            })
        }
    }

    fn job_output_dir(&self, output_dir: &Path, id: &JobId) -> PathBuf {
        output_dir.join(&self.model).join(id.as_str())
    }
}
