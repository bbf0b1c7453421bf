//! 配置处理基准测试
//!
//! 测试配置解析、验证和序列化的性能

use criterion::{criterion_group, criterion_main, Criterion};
use site_vitals::config::{validate_config, Config, GlobalConfig, SiteConfig};
use std::hint::black_box;

const CONFIG_TOML: &str = r#"
[global]
check_interval_seconds = 30
request_timeout_ms = 6000
history_capacity = 10
timeline_limit = 10
log_level = "info"

[[sites]]
id = "blog"
name = "Blog"
url = "https://blog.example.com"
description = "个人博客"

[[sites]]
name = "Docs"
url = "https://docs.example.com"
"#;

fn config_processing_benchmark(c: &mut Criterion) {
    c.bench_function("config_serialization", |b| {
        let config = create_test_config(20);

        b.iter(|| black_box(toml::to_string(&config).unwrap()));
    });

    c.bench_function("config_deserialization", |b| {
        b.iter(|| {
            let config: Config = toml::from_str(black_box(CONFIG_TOML)).unwrap();
            black_box(config)
        });
    });

    c.bench_function("config_validation", |b| {
        let config = create_test_config(100);

        b.iter(|| black_box(validate_config(&config)));
    });
}

/// 创建包含 `sites` 个站点的测试配置
fn create_test_config(sites: usize) -> Config {
    Config {
        global: GlobalConfig::default(),
        sites: (0..sites)
            .map(|i| SiteConfig {
                id: Some(format!("site-{i}")),
                name: format!("站点 {i}"),
                url: format!("https://site{i}.example.com"),
                description: Some("测试站点".to_string()),
            })
            .collect(),
    }
}

criterion_group!(benches, config_processing_benchmark);
criterion_main!(benches);
