//! Stereo gain linking.
//!
//! The channel with less reduction is pulled towards the other one by the
//! link amount; the more reduced channel is left alone.

/// Blends two gain curves in place. `link` is 0 (independent) to 1 (fully linked).
pub fn link_gains(left: &mut [f32], right: &mut [f32], link: f32) {
    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        let (gl, gr) = (*l, *r);
        if gl < gr {
            *r = gr + (gl - gr) * link;
        } else {
            *l = gl + (gr - gl) * link;
        }
    }
}
