//! ImageScaler over NCHW batches.

use opkern_kernel_tests::OpTester;

#[test]
fn scales_and_biases_per_channel() {
    // One image, two channels of 2x2.
    OpTester::new("ImageScaler", 1)
        .attr("scale", 2.0f32)
        .attr("bias", vec![1.0f32, -1.0])
        .input(
            "x",
            [1, 2, 2, 2],
            vec![0.0f32, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0],
        )
        .expect_f32(
            "y",
            [1, 2, 2, 2],
            vec![1.0, 3.0, 5.0, 7.0, -1.0, 1.0, 3.0, 5.0],
        )
        .run();
}

#[test]
fn bias_cycles_across_batch_entries() {
    // Two images of one 1x2 channel each; both use bias[0].
    OpTester::new("ImageScaler", 1)
        .attr("bias", vec![10.0f32])
        .input("x", [2, 1, 1, 2], vec![1.0f32, 2.0, 3.0, 4.0])
        .expect_f32("y", [2, 1, 1, 2], vec![11.0, 12.0, 13.0, 14.0])
        .run();
}

#[test]
fn scale_defaults_to_one() {
    OpTester::new("ImageScaler", 1)
        .attr("bias", vec![0.5f32])
        .input("x", [1, 1, 1, 3], vec![1.0f32, 2.0, 3.0])
        .expect_f32("y", [1, 1, 1, 3], vec![1.5, 2.5, 3.5])
        .run();
}

#[test]
fn missing_bias_is_a_construction_error() {
    OpTester::new("ImageScaler", 1)
        .input("x", [1, 1, 1, 1], vec![1.0f32])
        .expect_f32("y", [1, 1, 1, 1], vec![1.0])
        .run_expect_error("missing required attribute bias");
}

#[test]
fn bias_length_must_match_the_channel_count() {
    OpTester::new("ImageScaler", 1)
        .attr("bias", vec![1.0f32, 2.0, 3.0])
        .input("x", [1, 2, 1, 1], vec![1.0f32, 2.0])
        .expect_f32("y", [1, 2, 1, 1], vec![0.0, 0.0])
        .run_expect_error("bias has 3 entries but the input has 2 channels");
}

#[test]
fn non_nchw_input_is_rejected() {
    OpTester::new("ImageScaler", 1)
        .attr("bias", vec![1.0f32])
        .input("x", [2, 2], vec![1.0f32, 2.0, 3.0, 4.0])
        .expect_f32("y", [2, 2], vec![0.0; 4])
        .run_expect_error("input must have shape [N,C,H,W]")
}
