//! WGSL shader source for the batched forward recurrence.

/// Batched Viterbi forward pass.
///
/// One workgroup per batch element; threads stride over output states and
/// meet at a storage barrier between frames (delta_t depends on the whole
/// delta_{t-1} row). The frame loop runs over the padded frame count, which
/// is uniform, with per-sequence work guarded inside so the barrier stays
/// in uniform control flow. Tie-breaks match the CPU kernel: ascending
/// scan, strict greater-than, smallest predecessor index wins.
///
/// delta is a (batch, 2, states) ping-pong buffer; frame t lives in half
/// t % 2. memo rows for frames past a sequence's length keep their
/// zero-initialized contents, which the backtrace never reads.
pub(crate) const FORWARD: &str = r#"
struct Params {
    batch: u32,
    frames: u32,
    states: u32,
    _pad: u32,
};

@group(0) @binding(0) var<storage, read> observation: array<f32>;
@group(0) @binding(1) var<storage, read> transition_t: array<f32>;
@group(0) @binding(2) var<storage, read> initial: array<f32>;
@group(0) @binding(3) var<storage, read> lens: array<u32>;
@group(0) @binding(4) var<storage, read_write> delta: array<f32>;
@group(0) @binding(5) var<storage, read_write> delta_term: array<f32>;
@group(0) @binding(6) var<storage, read_write> memo: array<i32>;
@group(0) @binding(7) var<uniform> params: Params;

const WG_SIZE: u32 = 256u;

@compute @workgroup_size(256)
fn viterbi_forward(
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
) {
    let b = wid.x;
    let s = params.states;
    let len = lens[b];

    var j = lid.x;
    while (j < s) {
        delta[(b * 2u) * s + j] = initial[j] + observation[b * params.frames * s + j];
        j = j + WG_SIZE;
    }
    storageBarrier();

    for (var t = 1u; t < params.frames; t = t + 1u) {
        if (t < len) {
            let prev = (b * 2u + (t - 1u) % 2u) * s;
            let cur = (b * 2u + t % 2u) * s;
            let row = (b * params.frames + t) * s;
            var jj = lid.x;
            while (jj < s) {
                var arg = 0u;
                var best = delta[prev] + transition_t[jj * s];
                for (var i = 1u; i < s; i = i + 1u) {
                    let p = delta[prev + i] + transition_t[jj * s + i];
                    if (p > best) {
                        best = p;
                        arg = i;
                    }
                }
                memo[row + jj] = i32(arg);
                delta[cur + jj] = best + observation[row + jj];
                jj = jj + WG_SIZE;
            }
        }
        storageBarrier();
    }

    let term = (b * 2u + (len - 1u) % 2u) * s;
    var k = lid.x;
    while (k < s) {
        delta_term[b * s + k] = delta[term + k];
        k = k + WG_SIZE;
    }
}
"#;
