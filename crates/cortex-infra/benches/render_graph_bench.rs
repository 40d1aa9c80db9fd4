// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::{Format, ResourceDesc, ResourceFlags};
use cortex_core::renderer::{GpuBackend, PassType, RenderGraph, RgUsage};
use cortex_infra::SoftwareBackend;

/// A chain of passes ping-ponging between render target, SRV and UAV use of
/// a few transients, the access pattern of a post-processing stack.
fn declare_chain(graph: &mut RenderGraph, passes: usize) {
    let desc = ResourceDesc::texture_2d(256, 256, Format::Rgba16Float)
        .with_flags(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_UNORDERED_ACCESS);
    let targets: Vec<_> = (0..4)
        .map(|i| graph.create_transient(desc, &format!("Target {i}")))
        .collect();
    for i in 0..passes {
        let src = targets[i % targets.len()];
        let dst = targets[(i + 1) % targets.len()];
        let (ty, usage) = if i % 2 == 0 {
            (PassType::Graphics, RgUsage::RENDER_TARGET)
        } else {
            (PassType::Compute, RgUsage::UNORDERED_ACCESS)
        };
        graph
            .add_pass(&format!("Pass {i}"), ty)
            .read(src, RgUsage::SHADER_RESOURCE)
            .write(dst, usage)
            .execute(|_| Ok(()));
    }
}

fn bench_render_graph(c: &mut Criterion) {
    let config = RendererConfig::default();
    let backend = SoftwareBackend::new();
    let adapter = backend.enumerate_adapters().remove(0);
    let device = backend
        .create_device(&adapter, Default::default())
        .expect("software device");
    let mut graph = RenderGraph::new(device, &config);

    let mut group = c.benchmark_group("Render Graph");

    for passes in [8, 64] {
        group.bench_function(format!("Declare + compile ({passes} passes, pooled)"), |b| {
            b.iter(|| {
                graph.begin_frame();
                declare_chain(&mut graph, passes);
                graph.compile().expect("compile");
                black_box(graph.stats());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render_graph);
criterion_main!(benches);
