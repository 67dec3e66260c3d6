//! # 元素图片灰度化 — 命令行入口
//!
//! 用法：
//!
//! ```text
//! canvas-grayscale <图片地址 | element.json> [--config config.json] [--styles styles.css]
//! ```
//!
//! 图片地址会被包装成 `<img src=...>`；`.json` 参数按 `HtmlElement` 反序列化。
//! 转换后的元素以 JSON 输出到标准输出。

use std::path::Path;
use std::process::ExitCode;

use canvas_grayscale::element::StyleSheet;
use canvas_grayscale::{GrayscaleConfig, GrayscaleConverter, GrayscaleError, HtmlElement};

struct CliArgs {
    target: String,
    config: Option<String>,
    styles: Option<String>,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = std::env::args().skip(1);
    let mut target = None;
    let mut config = None;
    let mut styles = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().ok_or("--config 缺少文件路径")?),
            "--styles" => styles = Some(args.next().ok_or("--styles 缺少文件路径")?),
            _ if target.is_none() => target = Some(arg),
            other => return Err(format!("无法识别的参数：{}", other)),
        }
    }

    let target = target.ok_or(
        "用法：canvas-grayscale <图片地址 | element.json> [--config config.json] [--styles styles.css]",
    )?;

    Ok(CliArgs {
        target,
        config,
        styles,
    })
}

fn load_config(path: Option<&str>) -> Result<GrayscaleConfig, GrayscaleError> {
    let Some(path) = path else {
        return Ok(GrayscaleConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .map_err(|e| GrayscaleError::Config(format!("无法读取配置文件 {}：{}", path, e)))?;
    GrayscaleConfig::from_json_str(&text)
}

fn load_element(target: &str) -> Result<HtmlElement, GrayscaleError> {
    let is_json = Path::new(target)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if !is_json {
        return Ok(HtmlElement::new("img").with_attribute("src", target));
    }

    let text = std::fs::read_to_string(target)
        .map_err(|e| GrayscaleError::Config(format!("无法读取元素文件 {}：{}", target, e)))?;
    serde_json::from_str(&text)
        .map_err(|e| GrayscaleError::Config(format!("元素 JSON 解析失败：{}", e)))
}

async fn run(args: CliArgs) -> Result<HtmlElement, GrayscaleError> {
    let config = load_config(args.config.as_deref())?;
    let mut converter = GrayscaleConverter::new(config)?;

    if let Some(path) = args.styles.as_deref() {
        let css = std::fs::read_to_string(path)
            .map_err(|e| GrayscaleError::Config(format!("无法读取样式文件 {}：{}", path, e)))?;
        let sheet = StyleSheet::parse(&css);
        if sheet.is_empty() {
            log::warn!("⚠️ 样式表 {} 中没有可用规则", path);
        } else {
            log::info!("🎨 已加载样式表 {}：{} 条规则", path, sheet.len());
        }
        converter = converter.with_stylesheet(sheet);
    }

    let mut element = load_element(&args.target)?;
    converter.convert(&mut element).await?;
    Ok(element)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(element) => match serde_json::to_string_pretty(&element) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(err) => {
                log::error!("输出序列化失败: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            log::error!("灰度转换失败 [{}]: {err}", err.code());
            ExitCode::FAILURE
        }
    }
}
