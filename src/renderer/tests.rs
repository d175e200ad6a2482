use super::*;
use crate::renderer::backend::mock::{Call, MockBackend};
use crate::renderer::backend::desc::{AddressMode, DescriptorSource, Filter, SamplerDesc};
use crate::renderer::core::adapter::AdapterKind;
use crate::renderer::core::state::{Barrier, ResourceId};
use crate::renderer::shader_data::PerObjectData;
use crate::renderer::stage::InitStage;

fn assets() -> RenderAssets {
    let pixels = (0..4 * 4)
        .flat_map(|index| [index as u8 * 16, 0, 255 - index as u8 * 16, 255])
        .collect();
    RenderAssets {
        shader_source: include_str!("../../assets/shader.wgsl").to_string(),
        texture: TextureData::from_rgba8(pixels, 4, 4).unwrap(),
    }
}

fn renderer_with(backend: MockBackend, config: RenderConfig) -> Renderer<MockBackend> {
    let mut renderer = Renderer::new(backend, Extent::new(1280, 720), config, &assets()).unwrap();
    renderer.dev.backend.clear_calls();
    renderer
}

fn renderer() -> Renderer<MockBackend> {
    renderer_with(MockBackend::new(), RenderConfig::default())
}

fn executed(backend: &MockBackend) -> Vec<&Vec<Command>> {
    backend
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::Execute(commands) => Some(commands),
            _ => None,
        })
        .collect()
}

fn presented(backend: &MockBackend) -> Vec<usize> {
    backend
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::Present { back_buffer } => Some(*back_buffer),
            _ => None,
        })
        .collect()
}

#[test]
fn frames_signal_increasing_fence_values() {
    let mut renderer = renderer();
    for _ in 0..3 {
        renderer.update_at(Duration::from_millis(16)).unwrap();
        renderer.render().unwrap();
    }

    let backend = renderer.backend();
    let frame_fence = renderer.dev.frame_fence.handle();
    let signaled = backend
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::Signal { fence, value } if *fence == frame_fence => Some(*value),
            _ => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(executed(backend).len(), 3);
    assert_eq!(signaled, vec![1, 2, 3]);
    assert_eq!(presented(backend), vec![0, 1, 0]);
    assert_eq!(renderer.stats(), FrameStats {
        frames_rendered: 3,
        last_fence_value: 3,
    });
}

#[test]
fn every_frame_waits_before_the_next_reset() {
    let mut renderer = renderer();
    renderer.render().unwrap();
    renderer.render().unwrap();

    let calls = renderer.backend().calls();
    let resets = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| **call == Call::ResetAllocator)
        .map(|(position, _)| position)
        .collect::<Vec<_>>();
    let first_wait = calls
        .iter()
        .position(|call| matches!(call, Call::WaitForValue { value: 1, .. }))
        .unwrap();
    assert_eq!(resets.len(), 2);
    assert!(resets[0] < first_wait && first_wait < resets[1]);
}

#[test]
fn frame_transitions_back_buffer_around_drawing() {
    let mut renderer = renderer();
    renderer.render().unwrap();

    let backend = renderer.backend();
    let commands = executed(backend)[0];
    let to_render_target = Command::Barrier(Barrier {
        resource: ResourceId::BackBuffer(0),
        before: ResourceState::Present,
        after: ResourceState::RenderTarget,
    });
    let to_present = Command::Barrier(Barrier {
        resource: ResourceId::BackBuffer(0),
        before: ResourceState::RenderTarget,
        after: ResourceState::Present,
    });

    let first_barrier = commands.iter().position(|command| *command == to_render_target).unwrap();
    let clear = commands
        .iter()
        .position(|command| matches!(command, Command::ClearRenderTarget { .. }))
        .unwrap();
    let draw = commands
        .iter()
        .position(|command| matches!(command, Command::DrawIndexed { index_count: 36, .. }))
        .unwrap();
    assert!(first_barrier < clear && clear < draw);
    assert_eq!(commands.last(), Some(&to_present));

    assert!(matches!(commands[0], Command::SetPipeline(_)));
    let Command::ClearRenderTarget { view, color } = commands[clear] else {
        unreachable!();
    };
    assert_eq!(color, RenderConfig::default().clear_color);
    assert_eq!(backend.descriptor_at(view), Some(DescriptorSource::RenderTarget { back_buffer: 0 }));
    for index in 0..renderer.dev.target.back_buffer_count() {
        assert_eq!(backend.back_buffer_state(index), ResourceState::Present);
    }
}

#[test]
fn clear_uses_the_configured_color() {
    let config = RenderConfig {
        clear_color: [1.0, 0.5, 0.25, 1.0],
        ..RenderConfig::default()
    };
    let mut renderer = renderer_with(MockBackend::new(), config);
    renderer.render().unwrap();

    let commands = executed(renderer.backend())[0];
    assert!(commands.iter().any(|command| matches!(
        command,
        Command::ClearRenderTarget { color, .. } if *color == [1.0, 0.5, 0.25, 1.0]
    )));
}

#[test]
fn configured_sampler_reaches_the_sampler_heap() {
    let sampler = SamplerDesc {
        filter: Filter::Nearest,
        address_mode: AddressMode::ClampToEdge,
    };
    let config = RenderConfig {
        sampler,
        ..RenderConfig::default()
    };
    let renderer = renderer_with(MockBackend::new(), config);

    let view = renderer.res.sampler_view().unwrap();
    assert_eq!(renderer.backend().descriptor_at(view), Some(DescriptorSource::Sampler(sampler)));
}

#[test]
fn back_buffer_index_always_comes_from_the_swapchain() {
    let backend = MockBackend::new()
        .with_back_buffer_count(3)
        .with_acquire_order([2, 0, 1, 1]);
    let mut renderer = renderer_with(backend, RenderConfig::default());

    for _ in 0..5 {
        renderer.render().unwrap();
        assert!(renderer.dev.target.current_index() < 3);
    }
    assert_eq!(presented(renderer.backend()), vec![0, 2, 0, 1, 1]);
}

#[test]
fn resize_between_frames_rebuilds_the_target() {
    let mut renderer = renderer();
    renderer.render().unwrap();
    renderer.render().unwrap();
    // Work still in flight when the resize arrives
    let pending = renderer.dev.frame_fence.signal(&mut renderer.dev.backend).unwrap();
    renderer.dev.backend.clear_calls();

    renderer.resize(640, 480).unwrap();
    assert_eq!(renderer.extent(), Extent::new(640, 480));

    let calls = renderer.backend().calls().to_vec();
    let wait = calls
        .iter()
        .position(|call| matches!(call, Call::WaitForValue { value, .. } if *value == pending))
        .unwrap();
    let release = calls.iter().position(|call| *call == Call::ReleaseBackBuffers).unwrap();
    let resize = calls
        .iter()
        .position(|call| *call == Call::ResizeBackBuffers(Extent::new(640, 480)))
        .unwrap();
    assert!(wait < release && release < resize);

    let views = calls[resize..]
        .iter()
        .filter(|call| matches!(call, Call::WriteDescriptor { source: DescriptorSource::RenderTarget { .. }, .. }))
        .count();
    assert_eq!(views, renderer.dev.target.back_buffer_count());

    renderer.dev.backend.clear_calls();
    renderer.render().unwrap();
    let commands = executed(renderer.backend())[0];
    assert!(commands.contains(&Command::SetViewport(Viewport {
        x: 0.0,
        y: 0.0,
        width: 640.0,
        height: 480.0,
        min_depth: 0.0,
        max_depth: 1.0,
    })));
    assert!(commands.contains(&Command::SetScissor(ScissorRect {
        left: 0,
        top: 0,
        right: 640,
        bottom: 480,
    })));
}

#[test]
fn minimized_window_skips_frames() {
    let mut renderer = renderer();
    renderer.render().unwrap();
    renderer.dev.backend.clear_calls();

    renderer.resize(0, 0).unwrap();
    assert!(renderer.is_minimized());
    renderer.render().unwrap();
    renderer.render().unwrap();
    assert!(renderer.backend().calls().is_empty());
    assert_eq!(renderer.extent(), Extent::new(1280, 720));
    assert_eq!(renderer.stats().frames_rendered, 1);

    renderer.resize(800, 600).unwrap();
    assert!(!renderer.is_minimized());
    renderer.render().unwrap();
    assert_eq!(renderer.stats().frames_rendered, 2);
    assert_eq!(renderer.backend().back_buffer_extent(), Extent::new(800, 600));
}

#[test]
fn surface_vanishing_mid_frame_skips_until_it_returns() {
    let mut renderer = renderer();
    renderer.render().unwrap();

    // Minimized after the resize event was handled: the next acquire finds no surface
    renderer.dev.backend.set_surface_available(false);
    renderer.render().unwrap();
    assert_eq!(renderer.stats().frames_rendered, 2);
    assert!(!renderer.dev.target.is_available());

    renderer.dev.backend.clear_calls();
    renderer.render().unwrap();
    renderer.render().unwrap();
    assert!(executed(renderer.backend()).is_empty());
    assert!(presented(renderer.backend()).is_empty());
    assert_eq!(renderer.stats().frames_rendered, 2);

    renderer.dev.backend.set_surface_available(true);
    renderer.render().unwrap();
    assert_eq!(renderer.stats().frames_rendered, 3);
    assert_eq!(presented(renderer.backend()), vec![0]);
}

#[test]
fn restoring_to_the_same_size_resumes_without_resizing() {
    let mut renderer = renderer();
    renderer.resize(0, 0).unwrap();
    renderer.resize(1280, 720).unwrap();
    assert!(!renderer.is_minimized());
    assert!(!renderer.backend().calls().iter().any(|call| matches!(call, Call::ResizeBackBuffers(_))));
    renderer.render().unwrap();
}

#[test]
fn triangle_draws_without_indices() {
    let config = RenderConfig {
        geometry: GeometryKind::Triangle,
        ..RenderConfig::default()
    };
    let mut renderer = renderer_with(MockBackend::new(), config);
    renderer.render().unwrap();

    let commands = executed(renderer.backend())[0];
    assert!(commands.contains(&Command::Draw {
        vertex_count: 3,
        instance_count: 1,
    }));
    assert!(!commands.iter().any(|command| matches!(
        command,
        Command::DrawIndexed { .. } | Command::SetIndexBuffer(_)
    )));
}

#[test]
fn each_object_draws_with_its_own_constants() {
    let config = RenderConfig {
        object_count: 3,
        ..RenderConfig::default()
    };
    let mut renderer = renderer_with(MockBackend::new(), config);
    renderer.update_at(Duration::from_secs(1)).unwrap();
    renderer.render().unwrap();

    let backend = renderer.backend();
    let commands = executed(backend)[0];
    let constants_parameter = renderer.pip.parameter_of(BindingCategory::ConstantBuffer).unwrap();
    let tables = commands
        .iter()
        .filter_map(|command| match command {
            Command::SetDescriptorTable { parameter, base } if *parameter == constants_parameter => Some(*base),
            _ => None,
        })
        .collect::<Vec<_>>();
    let draws = commands
        .iter()
        .filter(|command| matches!(command, Command::DrawIndexed { .. }))
        .count();

    assert_eq!(draws, 3);
    assert_eq!(tables.len(), 3);
    let offsets = tables.iter().map(|base| {
        match backend.descriptor_at(*base) {
            Some(DescriptorSource::ConstantBuffer { offset, .. }) => offset,
            other => panic!("expected a constant buffer view, found {:?}", other),
        }
    }).collect::<Vec<_>>();
    assert_eq!(offsets, vec![0, 256, 512]);

    let bytes = backend.buffer_bytes(renderer.res.constants.handle()).unwrap();
    let expected = renderer.frm.object_constants(Duration::from_secs(1), renderer.extent());
    for (slot, constants) in expected.iter().enumerate() {
        let start = slot * 256;
        assert_eq!(&bytes[start..start + size_of::<PerObjectData>()], bytemuck::bytes_of(constants));
    }
}

#[test]
fn texture_failure_names_the_stage() {
    let result = Renderer::new(
        MockBackend::new().failing_texture_creation(),
        Extent::new(1280, 720),
        RenderConfig::default(),
        &assets(),
    );
    let error = result.err().unwrap();
    assert_eq!(error.to_string(), InitStage::Texture.to_string());
}

#[test]
fn invalid_shader_fails_pipeline_stage() {
    let mut assets = assets();
    assets.shader_source = "fn main( {".to_string();
    let error = Renderer::new(MockBackend::new(), Extent::new(1280, 720), RenderConfig::default(), &assets)
        .err()
        .unwrap();
    assert_eq!(error.to_string(), InitStage::Pipeline.to_string());
}

#[test]
fn software_adapter_renders_the_same_frame() {
    let mut renderer = renderer_with(MockBackend::with_adapter(AdapterKind::Software), RenderConfig::default());
    renderer.render().unwrap();
    assert_eq!(renderer.backend().adapter().kind, AdapterKind::Software);
    assert_eq!(presented(renderer.backend()), vec![0]);
}

#[test]
fn starting_minimized_renders_nothing_until_resized() {
    let mut renderer = Renderer::new(
        MockBackend::new(),
        Extent::new(0, 0),
        RenderConfig::default(),
        &assets(),
    )
        .unwrap();
    assert!(renderer.is_minimized());
    renderer.dev.backend.clear_calls();
    renderer.render().unwrap();
    assert!(renderer.backend().calls().is_empty());

    renderer.resize(320, 240).unwrap();
    renderer.render().unwrap();
    assert_eq!(renderer.stats().frames_rendered, 1);
}
