//! End-to-end TopK runs through the shared registry.

use opkern_kernel_tests::OpTester;

// Rows are [0.1, 0.3, 0.2, 0.4] and [0.1, 0.3, 0.3, 0.2]; the second row
// carries a tie at 0.3.
fn input() -> Vec<f32> {
    vec![0.1, 0.3, 0.2, 0.4, 0.1, 0.3, 0.3, 0.2]
}

#[test]
fn top_1_of_4() {
    OpTester::new("TopK", 1)
        .attr("k", 1i64)
        .input("x", [2, 4], input())
        .expect_f32("values", [2, 1], vec![0.4, 0.3])
        .expect_i64("indices", [2, 1], vec![3, 1])
        .run();
}

#[test]
fn top_2_of_4() {
    OpTester::new("TopK", 1)
        .attr("k", 2i64)
        .input("x", [2, 4], input())
        .expect_f32("values", [2, 2], vec![0.4, 0.3, 0.3, 0.3])
        .expect_i64("indices", [2, 2], vec![3, 1, 1, 2])
        .run();
}

#[test]
fn top_3_of_4() {
    OpTester::new("TopK", 1)
        .attr("k", 3i64)
        .input("x", [2, 4], input())
        .expect_f32("values", [2, 3], vec![0.4, 0.3, 0.2, 0.3, 0.3, 0.2])
        .expect_i64("indices", [2, 3], vec![3, 1, 2, 1, 2, 3])
        .run();
}

#[test]
fn top_all_keeps_ties_in_index_order() {
    OpTester::new("TopK", 1)
        .attr("k", 4i64)
        .input("x", [2, 4], input())
        .expect_f32(
            "values",
            [2, 4],
            vec![0.4, 0.3, 0.2, 0.1, 0.3, 0.3, 0.2, 0.1],
        )
        .expect_i64("indices", [2, 4], vec![3, 1, 2, 0, 1, 2, 3, 0])
        .run();
}

#[test]
fn top_k_along_the_first_axis() {
    OpTester::new("TopK", 1)
        .attr("k", 1i64)
        .attr("axis", 0i64)
        .input("x", [2, 4], input())
        .expect_f32("values", [1, 4], vec![0.1, 0.3, 0.3, 0.4])
        .expect_i64("indices", [1, 4], vec![0, 0, 1, 0])
        .run();
}

#[test]
fn k_zero_is_a_recoverable_construction_error() {
    OpTester::new("TopK", 1)
        .attr("k", 0i64)
        .input("x", [2, 4], input())
        .expect_f32("values", [2, 0], vec![])
        .expect_i64("indices", [2, 0], vec![])
        .run_expect_error("k must be a positive value");
}

#[test]
fn k_beyond_the_axis_extent_is_rejected() {
    OpTester::new("TopK", 1)
        .attr("k", 5i64)
        .input("x", [2, 4], input())
        .expect_f32("values", [2, 5], vec![0.0; 10])
        .expect_i64("indices", [2, 5], vec![0; 10])
        .run_expect_error("exceeds dimension");
}

#[test]
fn missing_k_is_rejected() {
    OpTester::new("TopK", 1)
        .input("x", [2, 4], input())
        .expect_f32("values", [2, 1], vec![0.4, 0.3])
        .expect_i64("indices", [2, 1], vec![3, 1])
        .run_expect_error("missing required attribute k");
}
