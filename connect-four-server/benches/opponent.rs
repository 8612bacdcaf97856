use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use connect_four::{select_move, Board, DeterministicRng, Mark};

fn midgame() -> Board {
    let mut board = Board::new();
    for (i, column) in [3, 3, 2, 4, 4, 2, 1, 5].into_iter().enumerate() {
        let mark = if i % 2 == 0 { Mark::A } else { Mark::B };
        let _ = board.apply_move(column, mark);
    }
    board
}

fn bench_select_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_move");
    for (name, board) in [("empty", Board::new()), ("midgame", midgame())] {
        for difficulty in [0, 2, 5] {
            group.bench_with_input(BenchmarkId::new(name, difficulty), &difficulty, |b, &difficulty| {
                let mut rng = DeterministicRng::new(42);
                b.iter(|| select_move(black_box(&board), Mark::B, difficulty, &mut rng));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_select_move);
criterion_main!(benches);
